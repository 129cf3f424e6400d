//! Per-target summary of TESS threshold-crossing events (TCEs) and objects of
//! interest (TOIs).
//!
//! TOI rows are aggregated by TIC id: the first row creates the summary and
//! later rows OR their comment flags into it. TCE rows are counted per TIC id,
//! ignoring TCE ids already seen in an earlier file. The two tables are then
//! outer-joined on TIC id with absent values filled with zero.
//!
//! The CSV readers trim fields, so a whitespace-only comment cell arrives as
//! an empty comment and counts as blank.

use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::aggregate::{aggregate_by_key, count_by_key};
use crate::catalogs::{csv_reader, read_rows, LoadStats};
use crate::comments::{classify_comment, is_blank, CommentFlags};
use crate::error::{CrossMatchError, Result};

/// Preamble lines in the TOI catalog CSV.
pub const TOI_PREAMBLE_LINES: usize = 4;
/// Preamble lines in a sector `tcestats.csv` file.
pub const TCE_PREAMBLE_LINES: usize = 6;

#[derive(Debug, Clone, PartialEq)]
pub struct ToiRow {
    pub tic: u64,
    pub comment: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TceRow {
    pub ticid: u64,
    pub tceid: String,
}

#[derive(Debug, Deserialize)]
struct ToiCsvRecord {
    #[serde(
        rename = "TIC",
        alias = "TIC ID",
        alias = "TICID",
        default,
        deserialize_with = "csv::invalid_option"
    )]
    tic: Option<u64>,
    #[serde(rename = "Public Comment", alias = "Comments", default)]
    comment: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TceCsvRecord {
    #[serde(alias = "TICID", default, deserialize_with = "csv::invalid_option")]
    ticid: Option<u64>,
    #[serde(default)]
    tceid: Option<String>,
}

impl ToiCsvRecord {
    fn into_row(self, row: usize) -> Result<ToiRow> {
        Ok(ToiRow {
            tic: self.tic.ok_or(CrossMatchError::MalformedRecord {
                catalog: "TOI",
                row,
                field: "TIC",
            })?,
            comment: self.comment,
        })
    }
}

impl TceCsvRecord {
    fn into_row(self, row: usize) -> Result<TceRow> {
        let missing = |field| CrossMatchError::MalformedRecord {
            catalog: "TCE",
            row,
            field,
        };
        Ok(TceRow {
            ticid: self.ticid.ok_or_else(|| missing("ticid"))?,
            tceid: self
                .tceid
                .filter(|t| !t.is_empty())
                .ok_or_else(|| missing("tceid"))?,
        })
    }
}

pub fn read_toi_rows<R: Read>(rdr: R, skip_lines: usize) -> Result<(Vec<ToiRow>, LoadStats)> {
    let mut csv_rdr = csv_reader(rdr, skip_lines)?;
    read_rows(&mut csv_rdr, "TOI", ToiCsvRecord::into_row)
}

pub fn read_tce_rows<R: Read>(rdr: R, skip_lines: usize) -> Result<(Vec<TceRow>, LoadStats)> {
    let mut csv_rdr = csv_reader(rdr, skip_lines)?;
    read_rows(&mut csv_rdr, "TCE", TceCsvRecord::into_row)
}

pub fn load_toi_file<P: AsRef<Path>>(path: P, skip_lines: usize) -> Result<Vec<ToiRow>> {
    info!("Reading TOI catalog {}", path.as_ref().display());
    let (rows, stats) = read_toi_rows(std::fs::File::open(path)?, skip_lines)?;
    info!("Read {} TOI rows ({} malformed)", rows.len(), stats.malformed);
    Ok(rows)
}

/// Read several sector TCE files, concatenated in order.
pub fn load_tce_files<P: AsRef<Path>>(paths: &[P], skip_lines: usize) -> Result<Vec<TceRow>> {
    let mut all = Vec::new();
    for path in paths {
        info!("Reading {}", path.as_ref().display());
        let (rows, stats) = read_tce_rows(std::fs::File::open(path)?, skip_lines)?;
        if stats.malformed > 0 {
            info!("Skipped {} malformed TCE rows", stats.malformed);
        }
        all.extend(rows);
    }
    Ok(all)
}

// ── Aggregation ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ToiSummary {
    pub tic: u64,
    pub flags: CommentFlags,
    /// At least one TOI of this target has no comment.
    pub blank: bool,
}

/// One summary per TIC id, in first-seen order.
pub fn summarize_tois(rows: &[ToiRow]) -> Vec<ToiSummary> {
    let flags_of = |row: &&ToiRow| {
        let comment = row.comment.as_deref();
        let flags = comment.map(classify_comment).unwrap_or_default();
        (flags, is_blank(comment))
    };
    aggregate_by_key(
        rows,
        |row| row.tic,
        |row| flags_of(row),
        |acc, row| {
            let (flags, blank) = flags_of(row);
            acc.0 = acc.0.union(flags);
            acc.1 |= blank;
        },
    )
    .into_iter()
    .map(|(tic, (flags, blank))| ToiSummary { tic, flags, blank })
    .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TceCounts {
    /// `(ticid, number of distinct TCEs)`, in first-seen order.
    pub counts: Vec<(u64, usize)>,
    /// Rows whose TCE id had already been counted.
    pub duplicate_tces: usize,
}

pub fn count_tces(rows: &[TceRow]) -> TceCounts {
    let mut visited: HashSet<&str> = HashSet::new();
    let mut duplicate_tces = 0usize;
    let unique = rows.iter().filter(|row| {
        let first = visited.insert(row.tceid.as_str());
        if !first {
            duplicate_tces += 1;
        }
        first
    });
    let counts = count_by_key(unique, |row| row.ticid);
    TceCounts {
        counts,
        duplicate_tces,
    }
}

/// One row of the per-target summary table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetSummary {
    #[serde(rename = "TICID")]
    pub ticid: u64,
    #[serde(rename = "TCE_Count")]
    pub tce_count: usize,
    pub is_toi: u8,
    pub eb: u8,
    pub variable: u8,
    pub odd_even: u8,
    pub v_shaped: u8,
    pub shoulders: u8,
    pub blank: u8,
}

impl TargetSummary {
    fn empty(ticid: u64) -> Self {
        Self {
            ticid,
            tce_count: 0,
            is_toi: 0,
            eb: 0,
            variable: 0,
            odd_even: 0,
            v_shaped: 0,
            shoulders: 0,
            blank: 0,
        }
    }
}

/// Outer join of TCE counts and TOI summaries on TIC id, zero-filled and
/// sorted by TIC id.
pub fn join_summaries(tces: &TceCounts, tois: &[ToiSummary]) -> Vec<TargetSummary> {
    let mut joined: BTreeMap<u64, TargetSummary> = BTreeMap::new();
    for &(ticid, count) in &tces.counts {
        joined.entry(ticid).or_insert_with(|| TargetSummary::empty(ticid)).tce_count += count;
    }
    for toi in tois {
        let row = joined
            .entry(toi.tic)
            .or_insert_with(|| TargetSummary::empty(toi.tic));
        row.is_toi = 1;
        row.eb = toi.flags.eb as u8;
        row.variable = toi.flags.variable as u8;
        row.odd_even = toi.flags.odd_even as u8;
        row.v_shaped = toi.flags.v_shaped as u8;
        row.shoulders = toi.flags.shoulders as u8;
        row.blank = toi.blank as u8;
    }
    joined.into_values().collect()
}

/// Summarise TOI and TCE rows into the joined per-target table.
pub fn summarize_targets(toi_rows: &[ToiRow], tce_rows: &[TceRow]) -> Vec<TargetSummary> {
    let tois = summarize_tois(toi_rows);
    info!("Length of TOI summary frame: {}", tois.len());
    let tces = count_tces(tce_rows);
    info!("Duplicate TCEs: {}", tces.duplicate_tces);
    info!("Length of TCE summary frame: {}", tces.counts.len());
    let joined = join_summaries(&tces, &tois);
    info!("Length of joined summary frame: {}", joined.len());
    joined
}

pub fn write_summary<W: Write>(writer: W, rows: &[TargetSummary]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn write_summary_to_file<P: AsRef<Path>>(path: P, rows: &[TargetSummary]) -> Result<()> {
    let file = std::fs::File::create(&path)?;
    write_summary(std::io::BufWriter::new(file), rows)?;
    info!("Wrote {} summary rows to {}", rows.len(), path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toi(tic: u64, comment: Option<&str>) -> ToiRow {
        ToiRow {
            tic,
            comment: comment.map(str::to_string),
        }
    }

    fn tce(ticid: u64, tceid: &str) -> TceRow {
        TceRow {
            ticid,
            tceid: tceid.to_string(),
        }
    }

    #[test]
    fn toi_flags_are_or_merged_per_target() {
        let rows = vec![
            toi(5, Some("possible EB")),
            toi(3, None),
            toi(5, Some("V-shaped, odd-even difference")),
            toi(3, Some("shoulders at ingress")),
        ];
        let summaries = summarize_tois(&rows);
        assert_eq!(summaries.len(), 2);

        let s5 = summaries[0];
        assert_eq!(s5.tic, 5);
        assert!(s5.flags.eb && s5.flags.v_shaped && s5.flags.odd_even);
        assert!(!s5.flags.shoulders && !s5.blank);

        let s3 = summaries[1];
        assert_eq!(s3.tic, 3);
        assert!(s3.blank);
        assert!(s3.flags.shoulders && !s3.flags.eb);
    }

    #[test]
    fn duplicate_tce_ids_are_counted_once() {
        let rows = vec![
            tce(10, "000010-01"),
            tce(10, "000010-02"),
            tce(20, "000020-01"),
            tce(10, "000010-01"),
        ];
        let counts = count_tces(&rows);
        assert_eq!(counts.counts, vec![(10, 2), (20, 1)]);
        assert_eq!(counts.duplicate_tces, 1);
    }

    #[test]
    fn outer_join_fills_missing_sides_with_zero() {
        let joined = summarize_targets(
            &[toi(30, Some("variable")), toi(10, Some(""))],
            &[tce(20, "a"), tce(10, "b"), tce(10, "c")],
        );
        let ids: Vec<u64> = joined.iter().map(|r| r.ticid).collect();
        assert_eq!(ids, vec![10, 20, 30]);

        assert_eq!((joined[0].tce_count, joined[0].is_toi, joined[0].blank), (2, 1, 1));
        assert_eq!((joined[1].tce_count, joined[1].is_toi, joined[1].variable), (1, 0, 0));
        assert_eq!((joined[2].tce_count, joined[2].is_toi, joined[2].variable), (0, 1, 1));
    }

    #[test]
    fn reads_toi_and_tce_csv_with_preamble() {
        let toi_csv = "\
# TOI catalog
# generated by MAST
# columns below
#
TIC,TOI,Public Comment
231663901,101.01,\"EB, V-shaped\"
231663901,101.02,
bad-tic,102.01,comment
";
        let (rows, stats) = read_toi_rows(toi_csv.as_bytes(), TOI_PREAMBLE_LINES).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(stats.malformed, 1);
        assert_eq!(rows[0].comment.as_deref(), Some("EB, V-shaped"));
        assert_eq!(rows[1].comment, None);

        let tce_csv = "\
line 1
line 2
line 3
line 4
line 5
line 6
tceid,ticid,planetNumber
000025155310-01,25155310,1
000025155310-02,25155310,2
";
        let (rows, stats) = read_tce_rows(tce_csv.as_bytes(), TCE_PREAMBLE_LINES).unwrap();
        assert_eq!(stats.malformed, 0);
        assert_eq!(rows, vec![tce(25155310, "000025155310-01"), tce(25155310, "000025155310-02")]);
    }

    #[test]
    fn writes_summary_header() {
        let mut buf = Vec::new();
        write_summary(&mut buf, &[TargetSummary::empty(42)]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "TICID,TCE_Count,is_toi,eb,variable,odd_even,v_shaped,shoulders,blank\n42,0,0,0,0,0,0,0,0\n"
        );
    }
}
