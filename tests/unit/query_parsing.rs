//! Command-line input parsing tests

use assert_matches::assert_matches;
use chrono::NaiveDate;
use test_log::test;

use stock_saver::models::{Adjust, Period, Target, TradeQuery};
use stock_saver::utils::{parse_date, parse_symbol_list};

#[test]
fn test_query_from_cli_strings() {
    let start = parse_date("20210301", "start-date").unwrap();
    let end = parse_date("20210616", "end-date").unwrap();
    let period: Period = "monthly".parse().unwrap();
    let adjust: Adjust = "qfq".parse().unwrap();

    let query = TradeQuery::new(start, end, period, adjust).unwrap();
    assert_eq!(query.start_date, NaiveDate::from_ymd_opt(2021, 3, 1).unwrap());
    assert_eq!(query.period.provider_code(), "103");
    assert_eq!(query.adjust.provider_code(), "1");
}

#[test]
fn test_invalid_inputs_are_rejected() {
    assert_matches!(parse_date("2021031", "start-date"), Err(_));
    assert_matches!("yearly".parse::<Period>(), Err(_));
    assert_matches!("bfq".parse::<Adjust>(), Err(_));
}

#[test]
fn test_symbol_target_keeps_order_and_duplicates() {
    let target = Target::Symbols(parse_symbol_list("600519,000001,600519"));
    assert_matches!(target, Target::Symbols(ref symbols) if symbols == &["600519", "000001", "600519"]);
}
