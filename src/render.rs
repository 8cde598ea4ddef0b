use chrono::{DateTime, Utc};
use comfy_table::{presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color, Table};

use crate::board::{BoardRow, BoardView};
use crate::format::ChangeClass;

pub const LOADING_TEXT: &str = "Loading...";
pub const UNAVAILABLE_TEXT: &str = "Data temporarily unavailable";
pub const UNREACHABLE_TEXT: &str = "Backend not reachable";

const COLUMNS: [&str; 4] = ["Coin", "Price", "24h", "Market Cap"];

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Message for the rows that span the whole table.
pub fn notice_text(row: &BoardRow) -> Option<String> {
    match row {
        BoardRow::Loading => Some(LOADING_TEXT.to_string()),
        BoardRow::Unavailable { warning: None } => Some(format!("⚠️ {UNAVAILABLE_TEXT}")),
        BoardRow::Unavailable { warning: Some(w) } => Some(format!("⚠️ {UNAVAILABLE_TEXT} ({w})")),
        BoardRow::Unreachable => Some(UNREACHABLE_TEXT.to_string()),
        BoardRow::Coin(_) => None,
    }
}

/// `<tr>` markup for the table body.
pub fn html_rows(rows: &[BoardRow]) -> String {
    let mut out = String::new();
    for row in rows {
        match row {
            BoardRow::Coin(c) => {
                let change_td = match c.change_class {
                    Some(class) => format!(r#"<td class="{}">{}</td>"#, class.as_str(), escape_html(&c.change)),
                    None => format!("<td>{}</td>", escape_html(&c.change)),
                };
                out.push_str(&format!(
                    "<tr><td>{}</td><td>{}</td>{}<td>{}</td></tr>\n",
                    escape_html(&c.label),
                    escape_html(&c.price),
                    change_td,
                    escape_html(&c.market_cap)
                ));
            }
            other => {
                let text = notice_text(other).unwrap_or_default();
                let class = match other {
                    BoardRow::Unreachable => r#" class="negative""#,
                    _ => "",
                };
                out.push_str(&format!(
                    r#"<tr><td colspan="{}"{}>{}</td></tr>"#,
                    COLUMNS.len(),
                    class,
                    escape_html(&text)
                ));
                out.push('\n');
            }
        }
    }
    out
}

fn updated_label(ts: f64) -> String {
    let secs = ts.floor() as i64;
    DateTime::<Utc>::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| "--".to_string())
}

/// Terminal table for `--mode once`: a header line, then the rows.
pub fn text_table(view: &BoardView) -> String {
    let heading = match &view.selection {
        Some(sel) => format!(
            "Top {} coins in {} • updated {}",
            sel.limit,
            sel.currency.to_uppercase(),
            updated_label(view.updated_ts)
        ),
        None => "No data loaded yet".to_string(),
    };

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(COLUMNS.map(|h| Cell::new(h).add_attribute(Attribute::Bold)));
    for i in 1..COLUMNS.len() {
        if let Some(col) = table.column_mut(i) {
            col.set_cell_alignment(CellAlignment::Right);
        }
    }

    for row in &view.rows {
        match row {
            BoardRow::Coin(c) => {
                let change = match c.change_class {
                    Some(ChangeClass::Positive) => Cell::new(&c.change).fg(Color::Green),
                    Some(ChangeClass::Negative) => Cell::new(&c.change).fg(Color::Red),
                    None => Cell::new(&c.change),
                };
                table.add_row(vec![
                    Cell::new(&c.label),
                    Cell::new(&c.price),
                    change,
                    Cell::new(&c.market_cap),
                ]);
            }
            other => {
                let text = notice_text(other).unwrap_or_default();
                let cell = match other {
                    BoardRow::Unreachable => Cell::new(text).fg(Color::Red),
                    BoardRow::Unavailable { .. } => Cell::new(text).fg(Color::Yellow),
                    _ => Cell::new(text),
                };
                table.add_row(vec![cell]);
            }
        }
    }

    format!("{heading}\n{table}\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::CoinRow;
    use crate::price_client::QuerySelection;

    fn coin(label: &str, change: &str, class: Option<ChangeClass>) -> BoardRow {
        BoardRow::Coin(CoinRow {
            label: label.to_string(),
            price: "1,000.00".to_string(),
            change: change.to_string(),
            change_class: class,
            market_cap: "2,000".to_string(),
        })
    }

    #[test]
    fn notice_rows_span_the_table() {
        assert_eq!(
            html_rows(&[BoardRow::Loading]),
            "<tr><td colspan=\"4\">Loading...</td></tr>\n"
        );
        assert_eq!(
            html_rows(&[BoardRow::Unreachable]),
            "<tr><td colspan=\"4\" class=\"negative\">Backend not reachable</td></tr>\n"
        );
        let html = html_rows(&[BoardRow::Unavailable {
            warning: Some("Served from cache".to_string()),
        }]);
        assert!(html.contains("Data temporarily unavailable (Served from cache)"));
    }

    #[test]
    fn change_cell_carries_sign_class() {
        let html = html_rows(&[
            coin("Bitcoin (BTC)", "-3.46%", Some(ChangeClass::Negative)),
            coin("Tether (USDT)", "N/A", None),
        ]);
        assert!(html.contains(r#"<td class="negative">-3.46%</td>"#));
        assert!(html.contains("<td>N/A</td>"));
        assert_eq!(html.matches("<tr>").count(), 2);
    }

    #[test]
    fn text_is_escaped() {
        let html = html_rows(&[coin("<b>Evil</b> (X&Y)", "1.00%", Some(ChangeClass::Positive))]);
        assert!(html.contains("&lt;b&gt;Evil&lt;/b&gt; (X&amp;Y)"));
        let html = html_rows(&[BoardRow::Unavailable {
            warning: Some("\"quoted\"".to_string()),
        }]);
        assert!(html.contains("&quot;quoted&quot;"));
    }

    #[test]
    fn text_table_lists_coins() {
        let view = BoardView {
            cycle_id: None,
            trigger: None,
            selection: Some(QuerySelection {
                currency: "usd".to_string(),
                limit: 10,
            }),
            rows: vec![
                coin("Bitcoin (BTC)", "-3.46%", Some(ChangeClass::Negative)),
                coin("Ether (ETH)", "2.00%", Some(ChangeClass::Positive)),
            ],
            updated_ts: 0.0,
        };
        let text = text_table(&view);
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines[0], "Top 10 coins in USD • updated 1970-01-01 00:00:00 UTC");

        let header = lines.iter().position(|l| l.contains("Coin")).unwrap();
        for col in COLUMNS {
            assert!(lines[header].contains(col));
        }
        let btc = lines.iter().position(|l| l.contains("Bitcoin (BTC)")).unwrap();
        let eth = lines.iter().position(|l| l.contains("Ether (ETH)")).unwrap();
        assert!(header < btc && btc < eth);
        assert!(lines[btc].contains("-3.46%"));
        assert!(lines[btc].contains("1,000.00"));
        assert!(lines[btc].contains("2,000"));
        assert!(lines[eth].contains("2.00%"));
    }

    #[test]
    fn text_table_shows_notice() {
        let view = BoardView {
            cycle_id: None,
            trigger: None,
            selection: None,
            rows: vec![BoardRow::Unreachable],
            updated_ts: 0.0,
        };
        let text = text_table(&view);
        assert!(text.starts_with("No data loaded yet\n"));
        assert!(text.contains(UNREACHABLE_TEXT));
        assert!(!text.contains("Bitcoin"));
    }
}
