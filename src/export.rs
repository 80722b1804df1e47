//! Ranking of reconstructed balances and the files written from it.

use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use alloy::primitives::{utils::format_units, Address, I256, U256};
use ratatui::{
    buffer::Buffer,
    layout::{Direction, Position, Rect},
    text::Line,
    widgets::{Bar, BarChart, BarGroup, Widget},
};
use tracing::info;

use crate::{balances::BalanceMap, rpc::DEFAULT_SYMBOL};

pub const CSV_HEADER: &str = "rank,address,balance,balance_raw";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Holder {
    /// 1-based position in the ranking.
    pub rank: usize,
    pub address: Address,
    pub balance: I256,
}

/// Sorts non-zero balances descending, ties by address. Negative balances are
/// kept and sink to the bottom; the zero address never ranks.
pub fn rank_holders(balances: &BalanceMap) -> Vec<Holder> {
    let mut ranked: Vec<(Address, I256)> = balances
        .iter()
        .filter(|(address, balance)| !balance.is_zero() && !address.is_zero())
        .map(|(address, balance)| (*address, *balance))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    ranked
        .into_iter()
        .enumerate()
        .map(|(index, (address, balance))| Holder {
            rank: index + 1,
            address,
            balance,
        })
        .collect()
}

pub fn format_balance(balance: I256, decimals: u8) -> crate::Result<String> {
    if decimals == 0 {
        return Ok(balance.to_string());
    }
    Ok(format_units(balance, decimals)?)
}

/// Keeps ASCII alphanumerics, `-` and `_` so a symbol is usable in a file name.
pub fn sanitize_symbol(symbol: &str) -> String {
    let sanitized: String = symbol
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();

    if sanitized.chars().all(|c| c == '_') {
        DEFAULT_SYMBOL.to_string()
    } else {
        sanitized
    }
}

pub fn to_csv(holders: &[Holder], decimals: u8) -> crate::Result<String> {
    let mut csv = String::from(CSV_HEADER);
    csv.push('\n');
    for holder in holders {
        // writing into a String cannot fail
        let _ = writeln!(
            csv,
            "{},{},{},{}",
            holder.rank,
            holder.address,
            format_balance(holder.balance, decimals)?,
            holder.balance
        );
    }
    Ok(csv)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExportedFiles {
    pub all: PathBuf,
    pub top: PathBuf,
}

/// Writes `holders_<SYMBOL>.csv` and `top<N>_holders_<SYMBOL>.csv` into
/// `output_dir`, creating it if needed.
pub fn export_csv(
    holders: &[Holder],
    symbol: &str,
    decimals: u8,
    top_n: usize,
    output_dir: &Path,
) -> crate::Result<ExportedFiles> {
    fs::create_dir_all(output_dir)
        .map_err(|e| crate::Error::CreateDirAllFailed(output_dir.to_path_buf(), e))?;

    let symbol = sanitize_symbol(symbol);
    let files = ExportedFiles {
        all: output_dir.join(format!("holders_{symbol}.csv")),
        top: output_dir.join(format!("top{top_n}_holders_{symbol}.csv")),
    };

    write(&files.all, &to_csv(holders, decimals)?)?;
    info!(path = %files.all.display(), holders = holders.len(), "wrote holders");

    let top = &holders[..holders.len().min(top_n)];
    write(&files.top, &to_csv(top, decimals)?)?;
    info!(path = %files.top.display(), holders = top.len(), "wrote top holders");

    Ok(files)
}

fn write(path: &Path, content: &str) -> crate::Result<()> {
    fs::write(path, content).map_err(|e| crate::Error::FileWriteFailed(path.to_path_buf(), e))
}

pub fn short_address(address: &Address) -> String {
    let full = address.to_string();
    format!("{}...{}", &full[..6], &full[full.len() - 4..])
}

/// Bars scale to `BAR_SCALE` at the largest balance.
const BAR_SCALE: u64 = 10_000;

/// Horizontal bar chart of the positive holders in `top`, `width` cells for
/// the longest bar. Bars scale to the largest balance, percentages are shares
/// of the charted total.
pub fn render_chart(top: &[Holder], symbol: &str, decimals: u8, width: u16) -> crate::Result<String> {
    let positive: Vec<(&Holder, U256)> = top
        .iter()
        .filter(|holder| holder.balance.is_positive())
        .map(|holder| (holder, holder.balance.into_raw()))
        .collect();

    let mut chart = format!("Top {} {symbol} holders (by balance)\n", top.len());
    let Some(largest) = positive.iter().map(|(_, raw)| *raw).max() else {
        chart.push_str("(no positive balances)\n");
        return Ok(chart);
    };
    let total = positive
        .iter()
        .fold(U256::ZERO, |acc, (_, raw)| acc.saturating_add(*raw));

    let mut label_width = 0;
    let mut bars = Vec::with_capacity(positive.len());
    for (holder, raw) in positive {
        let basis_points = scale(raw, total, 10_000);
        let label = format!(
            "{:>3}. {} {:>3}.{:02}%",
            holder.rank,
            short_address(&holder.address),
            basis_points / 100,
            basis_points % 100,
        );
        label_width = label_width.max(label.len());
        bars.push(
            Bar::default()
                .label(Line::from(label))
                .value(scale(raw, largest, BAR_SCALE).max(1))
                .text_value(format!("{} {symbol}", format_balance(holder.balance, decimals)?)),
        );
    }

    let label_width = u16::try_from(label_width).unwrap_or(u16::MAX);
    let area = Rect::new(
        0,
        0,
        label_width.saturating_add(1).saturating_add(width),
        u16::try_from(bars.len()).unwrap_or(u16::MAX),
    );
    let mut buffer = Buffer::empty(area);
    BarChart::default()
        .direction(Direction::Horizontal)
        .bar_width(1)
        .bar_gap(0)
        .max(BAR_SCALE)
        .data(BarGroup::default().bars(&bars))
        .render(area, &mut buffer);

    for y in 0..area.height {
        let row: String = (0..area.width)
            .map(|x| buffer.cell(Position::new(x, y)).map_or(" ", |cell| cell.symbol()))
            .collect();
        chart.push_str(row.trim_end());
        chart.push('\n');
    }
    Ok(chart)
}

/// `value * range / of`, for `value <= of`.
fn scale(value: U256, of: U256, range: u64) -> u64 {
    if of.is_zero() {
        return 0;
    }
    let scaled = value.saturating_mul(U256::from(range)) / of;
    u64::try_from(scaled).unwrap_or(range)
}

#[cfg(test)]
mod tests {
    use alloy::primitives::address;

    use super::*;
    use crate::transfer::tests::transfer;

    const ZERO: Address = Address::ZERO;
    const A: Address = address!("0x000000000000000000000000000000000000000a");
    const B: Address = address!("0x000000000000000000000000000000000000000b");
    const C: Address = address!("0x000000000000000000000000000000000000000c");
    const D: Address = address!("0x000000000000000000000000000000000000000d");

    fn balances() -> BalanceMap {
        BalanceMap::replay(vec![
            transfer(ZERO, A, 500, 1),
            transfer(ZERO, B, 300, 2),
            transfer(ZERO, C, 300, 3),
            transfer(D, A, 100, 4),
            transfer(B, ZERO, 300, 5),
        ])
        .unwrap()
    }

    #[test]
    fn ranks_descending_without_zero_balances() {
        let holders = rank_holders(&balances());

        let ranked: Vec<(usize, Address, i64)> = holders
            .iter()
            .map(|h| (h.rank, h.address, h.balance.as_i64()))
            .collect();
        // B burned everything, ZERO never ranks, D only sent
        assert_eq!(ranked, vec![(1, A, 600), (2, C, 300), (3, D, -100)]);
    }

    #[test]
    fn ties_break_by_address() {
        let balances = BalanceMap::replay(vec![
            transfer(ZERO, C, 10, 1),
            transfer(ZERO, B, 10, 2),
        ])
        .unwrap();

        let holders = rank_holders(&balances);

        assert_eq!(holders[0].address, B);
        assert_eq!(holders[1].address, C);
    }

    #[test]
    fn formats_with_decimals() {
        let value = I256::try_from(1_234_500i64).unwrap();
        assert_eq!(format_balance(value, 6).unwrap(), "1.234500");
        assert_eq!(format_balance(-value, 6).unwrap(), "-1.234500");
    }

    #[test]
    fn sanitizes_symbols() {
        assert_eq!(sanitize_symbol("USDT"), "USDT");
        assert_eq!(sanitize_symbol(" USD/T "), "USD_T");
        assert_eq!(sanitize_symbol("../"), "TOKEN");
        assert_eq!(sanitize_symbol(""), "TOKEN");
    }

    #[test]
    fn writes_full_and_top_csv() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("out");
        let holders = rank_holders(&balances());

        let files = export_csv(&holders, "T/K", 2, 2, &output_dir).unwrap();

        assert_eq!(files.all, output_dir.join("holders_T_K.csv"));
        assert_eq!(files.top, output_dir.join("top2_holders_T_K.csv"));

        let all = fs::read_to_string(&files.all).unwrap();
        assert_eq!(
            all,
            format!(
                "rank,address,balance,balance_raw\n\
                 1,{A},6.00,600\n\
                 2,{C},3.00,300\n\
                 3,{D},-1.00,-100\n"
            )
        );

        let top = fs::read_to_string(&files.top).unwrap();
        assert_eq!(top.lines().count(), 3);
        assert!(!top.contains(&D.to_string()));
    }

    #[test]
    fn chart_shows_shares_of_positive_total() {
        let holders = rank_holders(&balances());

        let chart = render_chart(&holders, "TK", 0, 10).unwrap();

        let lines: Vec<&str> = chart.lines().collect();
        assert_eq!(lines[0], "Top 3 TK holders (by balance)");
        // D is negative and left out
        assert_eq!(lines.len(), 3, "{chart}");
        assert!(lines[1].starts_with(&format!("  1. {}", short_address(&A))), "{chart}");
        assert!(lines[1].contains("66.66%"), "{chart}");
        assert!(lines[1].contains("600 TK"), "{chart}");
        assert!(lines[2].starts_with(&format!("  2. {}", short_address(&C))), "{chart}");
        assert!(lines[2].contains("33.33%"), "{chart}");
        assert!(lines[2].contains("300 TK"), "{chart}");
        // the value text is drawn over the bar, only the largest bar outgrows it
        assert!(lines[1].contains('█'), "{chart}");
        assert!(lines[1].chars().count() > lines[2].chars().count(), "{chart}");
    }

    #[test]
    fn chart_without_positive_holders() {
        let chart = render_chart(&[], "TK", 18, 10).unwrap();
        assert!(chart.contains("no positive balances"));
    }
}
