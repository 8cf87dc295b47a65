// src/eastmoney/models.rs
use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};

/// A raw row exactly as the data-center API returned it.
pub type RawRow = Map<String, Value>;

/// Top-level envelope of the data-center API.
/// `success: false` responses carry the error text in `message`.
#[derive(Debug, Deserialize)]
pub struct ApiResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<ReportPage>,
}

/// One page of report rows plus the pagination metadata the API reports.
#[derive(Debug, Deserialize)]
pub struct ReportPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default = "one_page")]
    pub pages: u32,
    #[serde(default)]
    pub data: Vec<RawRow>,
}

fn one_page() -> u32 {
    1
}

impl Default for ReportPage {
    fn default() -> Self {
        Self { count: 0, pages: 1, data: Vec::new() }
    }
}

/// Report quarter within a fiscal year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Quarter {
    Q1,
    Q2,
    Q3,
    Q4,
}

impl Quarter {
    pub const ALL: [Quarter; 4] = [Quarter::Q1, Quarter::Q2, Quarter::Q3, Quarter::Q4];

    /// Chinese report name, as used in the output file names.
    pub fn name(self) -> &'static str {
        match self {
            Quarter::Q1 => "一季报",
            Quarter::Q2 => "半年报",
            Quarter::Q3 => "三季报",
            Quarter::Q4 => "年报",
        }
    }

    fn month_day(self) -> (&'static str, &'static str) {
        match self {
            Quarter::Q1 => ("03", "31"),
            Quarter::Q2 => ("06", "30"),
            Quarter::Q3 => ("09", "30"),
            Quarter::Q4 => ("12", "31"),
        }
    }
}

impl FromStr for Quarter {
    type Err = String;

    /// Accepts Q1-Q4 (any case), bare digits, and the Chinese report names.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "Q1" | "1" | "一季报" | "1季报" => Ok(Quarter::Q1),
            "Q2" | "2" | "半年报" | "中报" | "2季报" => Ok(Quarter::Q2),
            "Q3" | "3" | "三季报" | "3季报" => Ok(Quarter::Q3),
            "Q4" | "4" | "年报" | "四季报" | "4季报" => Ok(Quarter::Q4),
            other => Err(format!(
                "invalid quarter '{}', expected Q1/Q2/Q3/Q4 or 一季报/半年报/三季报/年报",
                other
            )),
        }
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quarter::Q1 => write!(f, "Q1"),
            Quarter::Q2 => write!(f, "Q2"),
            Quarter::Q3 => write!(f, "Q3"),
            Quarter::Q4 => write!(f, "Q4"),
        }
    }
}

/// One report period (fiscal year + quarter) to download.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReportPeriod {
    pub year: u16,
    pub quarter: Quarter,
}

impl ReportPeriod {
    pub fn new(year: u16, quarter: Quarter) -> Self {
        Self { year, quarter }
    }

    /// REPORTDATE filter value for this period, e.g. "2024-12-31".
    pub fn report_date(&self) -> String {
        let (month, day) = self.quarter.month_day();
        format!("{}-{}-{}", self.year, month, day)
    }

    /// Output CSV file name for this period, e.g. "业绩报表_2024年年报.csv".
    pub fn file_name(&self) -> String {
        format!("业绩报表_{}年{}.csv", self.year, self.quarter.name())
    }
}

impl fmt::Display for ReportPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}年{}", self.year, self.quarter.name())
    }
}

/// Header row of the output CSV, in column order.
pub const CSV_HEADERS: [&str; 17] = [
    "股票代码",
    "股票简称",
    "交易市场",
    "更新日期",
    "报告日期",
    "每股收益(元)",
    "扣非每股收益(元)",
    "营业总收入(元)",
    "净利润(元)",
    "净资产收益率(%)",
    "营收同比增长(%)",
    "净利润同比增长(%)",
    "每股净资产(元)",
    "每股经营现金流(元)",
    "销售毛利率(%)",
    "分配方案",
    "公告日期",
];

/// One company's report snapshot, mapped to the fixed output columns.
/// All values are kept as text exactly as the API delivered them; nothing
/// here attempts numeric parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRecord {
    pub stock_code: String,
    pub short_name: String,
    pub market: String,
    pub update_date: String,
    pub report_date: String,
    pub eps: String,
    pub deduct_eps: String,
    pub total_revenue: String,
    pub net_profit: String,
    pub roe: String,
    pub revenue_yoy: String,
    pub net_profit_yoy: String,
    pub bps: String,
    pub cash_flow_ps: String,
    pub gross_margin: String,
    pub dividend_plan: String,
    pub notice_date: String,
}

impl ReportRecord {
    /// Maps a raw API row onto the fixed output schema.
    /// Missing or null source fields become empty strings, never errors.
    pub fn from_raw(raw: &RawRow) -> Self {
        Self {
            stock_code: text_field(raw, "SECURITY_CODE"),
            short_name: text_field(raw, "SECURITY_NAME_ABBR"),
            market: text_field(raw, "TRADE_MARKET"),
            update_date: text_field(raw, "UPDATE_DATE"),
            report_date: text_field(raw, "REPORTDATE"),
            eps: text_field(raw, "BASIC_EPS"),
            deduct_eps: text_field(raw, "DEDUCT_BASIC_EPS"),
            total_revenue: text_field(raw, "TOTAL_OPERATE_INCOME"),
            net_profit: text_field(raw, "PARENT_NETPROFIT"),
            roe: text_field(raw, "WEIGHTAVG_ROE"),
            revenue_yoy: text_field(raw, "YSTZ"),
            net_profit_yoy: text_field(raw, "SJLTZ"),
            bps: text_field(raw, "BPS"),
            cash_flow_ps: text_field(raw, "MGJYXJJE"),
            gross_margin: text_field(raw, "XSMLL"),
            dividend_plan: text_field(raw, "ASSIGNDSCRPT"),
            notice_date: text_field(raw, "NOTICE_DATE"),
        }
    }

    /// Field values in [`CSV_HEADERS`] order.
    pub fn to_row(&self) -> [&str; 17] {
        [
            &self.stock_code,
            &self.short_name,
            &self.market,
            &self.update_date,
            &self.report_date,
            &self.eps,
            &self.deduct_eps,
            &self.total_revenue,
            &self.net_profit,
            &self.roe,
            &self.revenue_yoy,
            &self.net_profit_yoy,
            &self.bps,
            &self.cash_flow_ps,
            &self.gross_margin,
            &self.dividend_plan,
            &self.notice_date,
        ]
    }
}

/// Extracts one field as text. Strings pass through unchanged; numbers keep
/// their JSON text form; null and missing keys yield an empty string.
fn text_field(raw: &RawRow, key: &str) -> String {
    match raw.get(key) {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}
