//! End-to-end batch saves: EastMoney client on a mock server, real CSV files

use pretty_assertions::assert_eq;
use std::fs;
use std::sync::Arc;
use tempfile::tempdir;
use tokio::sync::broadcast;
use wiremock::MockServer;

use stock_saver::api::EastMoneyClient;
use stock_saver::models::Target;
use stock_saver::stock_saver::{SaveError, SaveStatus, StockSaver};
use stock_saver::utils::{read_symbols_file, write_symbols_file};

use crate::common::fixtures::{mount_history, mount_spot_page, mount_unknown};
use crate::common::logging::{init_test_logging, log_test_data, log_test_step};
use crate::common::test_data::{test_config, test_query};

#[tokio::test]
async fn test_batch_survives_bad_symbols_and_reports_them() {
    init_test_logging();
    log_test_step("Testing batch save with one unknown and one unserved symbol");

    let server = MockServer::start().await;
    mount_history(&server, "0.000001", 3).await;
    mount_unknown(&server, "0.999999").await;
    mount_history(&server, "1.600519", 2).await;
    // 300750 has no mock, so the server answers 404

    let dir = tempdir().unwrap();
    let client = EastMoneyClient::new(&test_config(&server.uri())).unwrap();
    let saver = StockSaver::new(client, dir.path());

    let report = saver
        .save_trade_data(
            &test_query(),
            Target::symbols(["000001", "999999", "600519", "300750"]),
        )
        .await
        .expect("batch should not fail as a whole");
    log_test_data("Report", &report);

    assert_eq!(report.total, 4);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.records_written, 5);
    assert_eq!(report.failed_symbols().to_vec(), vec!["999999".to_string(), "300750".to_string()]);
    assert_eq!(report.succeeded + report.failed.len(), report.total);

    let trade_dir = dir.path().join("data/stock/trade/daily");
    assert_eq!(report.save_dir, trade_dir);

    let mut saved: Vec<String> = fs::read_dir(&trade_dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    saved.sort();
    assert_eq!(
        saved,
        vec!["000001_20210301_20210616.csv", "600519_20210301_20210616.csv"]
    );

    let bytes = fs::read(trade_dir.join("000001_20210301_20210616.csv")).unwrap();
    let (content, _, had_errors) = encoding_rs::GBK.decode(&bytes);
    assert!(!had_errors);
    assert!(content.starts_with("日期,开盘,"));
    assert_eq!(content.lines().count(), 4); // header + 3 bars

    assert!(matches!(report.errors[0].1, SaveError::Fetch(_)));
}

#[tokio::test]
async fn test_failed_list_drives_a_rerun() {
    init_test_logging();
    log_test_step("Testing re-run of only the failed symbols");

    let dir = tempdir().unwrap();
    let failed_file = dir.path().join("failed.txt");

    // First run: 600000 is not served yet
    {
        let server = MockServer::start().await;
        mount_history(&server, "0.000001", 1).await;

        let client = EastMoneyClient::new(&test_config(&server.uri())).unwrap();
        let saver = StockSaver::new(client, dir.path());
        let report = saver
            .save_trade_data(&test_query(), Target::symbols(["000001", "600000"]))
            .await
            .unwrap();

        assert_eq!(report.failed, vec!["600000".to_string()]);
        write_symbols_file(&failed_file, report.failed_symbols()).unwrap();
    }

    // Second run: only the failed code is requested
    let server = MockServer::start().await;
    mount_history(&server, "1.600000", 2).await;

    let client = EastMoneyClient::new(&test_config(&server.uri())).unwrap();
    let saver = StockSaver::new(client, dir.path());
    let retry = read_symbols_file(&failed_file).unwrap();
    let report = saver
        .save_trade_data(&test_query(), Target::Symbols(retry))
        .await
        .unwrap();

    assert!(report.all_succeeded());
    assert_eq!(report.total, 1);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
    assert!(dir
        .path()
        .join("data/stock/trade/daily/600000_20210301_20210616.csv")
        .is_file());
}

#[tokio::test]
async fn test_whole_market_target() {
    init_test_logging();

    let server = MockServer::start().await;
    mount_spot_page(&server, 1, 2, &["000001", "600519"]).await;
    mount_history(&server, "0.000001", 1).await;
    mount_history(&server, "1.600519", 1).await;

    let dir = tempdir().unwrap();
    let (sender, mut receiver) = broadcast::channel(32);
    let client = EastMoneyClient::new(&test_config(&server.uri())).unwrap();
    let saver = StockSaver::new(client, dir.path()).with_progress_sender(Arc::new(sender));

    let report = saver.save_trade_data(&test_query(), Target::All).await.unwrap();
    assert_eq!(report.total, 2);
    assert!(report.all_succeeded());

    let mut saved = Vec::new();
    while let Ok(progress) = receiver.try_recv() {
        if let SaveStatus::Saved { records } = progress.status {
            saved.push((progress.symbol, records));
        }
    }
    assert_eq!(saved, vec![("000001".to_string(), 1), ("600519".to_string(), 1)]);
}

#[tokio::test]
async fn test_empty_symbol_list_creates_directory_only() {
    init_test_logging();

    let server = MockServer::start().await;
    let dir = tempdir().unwrap();
    let mut saver = StockSaver::new(
        EastMoneyClient::new(&test_config(&server.uri())).unwrap(),
        "/nonexistent/never-used",
    );
    saver.reset_root(dir.path());
    assert_eq!(saver.root(), dir.path());
    assert_eq!(
        saver.data_saver().trade_dir(test_query().period),
        dir.path().join("data/stock/trade/daily")
    );

    let report = saver
        .save_trade_data(&test_query(), Target::Symbols(Vec::new()))
        .await
        .unwrap();

    assert_eq!(report.total, 0);
    assert!(report.all_succeeded());
    assert!(dir.path().join("data/stock/trade/daily").is_dir());
    assert!(server.received_requests().await.unwrap().is_empty());
}
