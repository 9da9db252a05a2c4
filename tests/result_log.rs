//! Result Log Integration Tests
//!
//! Completed results are appended to the JSONL log and can be replayed.

mod common;

use capflow::{AnalysisResult, Pipeline, ResultLog};
use common::{request, settings, GatedAnalyzer};
use tempfile::TempDir;

#[tokio::test]
async fn test_pipeline_appends_every_completion() {
    let temp = TempDir::new().unwrap();
    let log_path = temp.path().join("logs").join("results.jsonl");
    let log = ResultLog::open(&log_path).await.unwrap();

    let analyzer = GatedAnalyzer::open().failing_on("bad");
    let pipeline = Pipeline::with_result_log(analyzer, settings(2), log);

    pipeline.submit(request("good")).await.unwrap();
    assert!(pipeline.submit(request("bad")).await.is_err());
    // Cache hits are not logged again
    pipeline.submit(request("good")).await.unwrap();

    let reader = ResultLog::open(&log_path).await.unwrap();
    let logged: Vec<AnalysisResult<String>> = reader.replay().await.unwrap();
    assert_eq!(logged.len(), 2);
    assert_eq!(logged[0].payload.as_deref(), Some("GOOD"));
    assert!(!logged[1].success);

    let history = pipeline.history(None).await;
    let history_ids: Vec<_> = history.iter().map(|r| r.id).collect();
    let logged_ids: Vec<_> = logged.iter().map(|r| r.id).collect();
    assert_eq!(history_ids, logged_ids);
}

#[tokio::test]
async fn test_log_survives_pipeline_restart() {
    let temp = TempDir::new().unwrap();
    let log_path = temp.path().join("results.jsonl");

    for input in ["first", "second"] {
        let log = ResultLog::open(&log_path).await.unwrap();
        let pipeline = Pipeline::with_result_log(GatedAnalyzer::open(), settings(1), log);
        pipeline.submit(request(input)).await.unwrap();
    }

    let reader = ResultLog::open(&log_path).await.unwrap();
    let logged: Vec<AnalysisResult<String>> = reader.replay().await.unwrap();
    let payloads: Vec<_> = logged.into_iter().filter_map(|r| r.payload).collect();
    assert_eq!(payloads, vec!["FIRST".to_string(), "SECOND".to_string()]);
}
