//! Canned EastMoney responses mounted on a wiremock server

use serde_json::{json, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::test_data::{kline_line, KLINE_PATH, SPOT_PATH};

pub fn kline_body(symbol: &str, lines: &[String]) -> Value {
    json!({
        "rc": 0,
        "data": {
            "code": symbol,
            "market": 0,
            "name": "测试股份",
            "klines": lines,
        }
    })
}

pub fn spot_body(total: usize, codes: &[&str]) -> Value {
    let diff: Vec<Value> = codes
        .iter()
        .map(|code| json!({ "f12": code, "f14": "测试股份" }))
        .collect();

    json!({ "rc": 0, "data": { "total": total, "diff": diff } })
}

/// Serve `bars` daily bars for `secid`
pub async fn mount_history(server: &MockServer, secid: &str, bars: usize) {
    let lines: Vec<String> = (0..bars)
        .map(|i| kline_line(&format!("2021-03-{:02}", i + 1), 10.0 + i as f64))
        .collect();
    let symbol = secid.split('.').nth(1).unwrap_or(secid);

    Mock::given(method("GET"))
        .and(path(KLINE_PATH))
        .and(query_param("secid", secid))
        .respond_with(ResponseTemplate::new(200).set_body_json(kline_body(symbol, &lines)))
        .mount(server)
        .await;
}

/// Serve `data: null`, the provider's answer for an unknown code
pub async fn mount_unknown(server: &MockServer, secid: &str) {
    Mock::given(method("GET"))
        .and(path(KLINE_PATH))
        .and(query_param("secid", secid))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "rc": 0, "data": null })))
        .mount(server)
        .await;
}

/// Serve one page of the symbol list
pub async fn mount_spot_page(server: &MockServer, page: usize, total: usize, codes: &[&str]) {
    Mock::given(method("GET"))
        .and(path(SPOT_PATH))
        .and(query_param("pn", page.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(spot_body(total, codes)))
        .mount(server)
        .await;
}
