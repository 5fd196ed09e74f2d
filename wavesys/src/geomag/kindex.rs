use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};
use std::io::BufRead;
use std::path::Path;

/// Daily geomagnetic activity class derived from the eight 3-hour K indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activity {
  Quiet,
  Low,
  Medium,
  Storm,
  HeavyStorm,
}

impl Activity {
  pub const ALL: [Activity; 5] = [
    Activity::Quiet,
    Activity::Low,
    Activity::Medium,
    Activity::Storm,
    Activity::HeavyStorm,
  ];

  pub fn matches(&self, k: &[i32; 8]) -> bool {
    let all_in = |hi: i32| k.iter().all(|k| (0..=hi).contains(k));
    let any_in = |lo: i32, hi: i32| k.iter().any(|k| (lo..=hi).contains(k));
    match self {
      Activity::Quiet => all_in(2),
      Activity::Low => all_in(3) && any_in(3, 3),
      Activity::Medium => all_in(4) && any_in(4, 4),
      Activity::Storm => all_in(5) && any_in(5, 6),
      Activity::HeavyStorm => any_in(7, i32::MAX),
    }
  }
}

impl std::fmt::Display for Activity {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let name = match self {
      Activity::Quiet => "quiet",
      Activity::Low => "low",
      Activity::Medium => "medium",
      Activity::Storm => "storm",
      Activity::HeavyStorm => "heavy_storm",
    };
    write!(f, "{}", name)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KIndexDay {
  pub date: NaiveDate,
  pub k: [i32; 8],
  /// Daily sum as published
  pub sk: i32,
}

impl KIndexDay {
  /// Every class the day satisfies, possibly none.
  pub fn classify(&self) -> Vec<Activity> {
    Activity::ALL
      .into_iter()
      .filter(|a| a.matches(&self.k))
      .collect()
  }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct KIndexTable {
  pub days: Vec<KIndexDay>,
}

fn find(header: &[&str], name: &str) -> anyhow::Result<usize> {
  header
    .iter()
    .position(|h| *h == name)
    .ok_or_else(|| anyhow::anyhow!("K-index header has no {} column", name))
}

impl KIndexTable {
  pub fn read(path: &Path) -> anyhow::Result<Self> {
    let file = std::fs::File::open(path)
      .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;
    Self::parse(std::io::BufReader::new(file))
  }

  /// Whitespace separated table with a `DA-MON-YR ... 1 .. 8 SK` header line.
  pub fn parse<R: BufRead>(reader: R) -> anyhow::Result<Self> {
    let mut lines = reader.lines();
    let header = loop {
      let line = lines
        .next()
        .ok_or_else(|| anyhow::anyhow!("K-index table has no DA-MON-YR header"))??;
      if line.contains("DA-MON-YR") {
        break line;
      }
    };
    let header: Vec<&str> = header.split_whitespace().collect();
    let date_col = find(&header, "DA-MON-YR")?;
    let sk_col = find(&header, "SK")?;
    let mut k_cols = [0; 8];
    for (i, col) in k_cols.iter_mut().enumerate() {
      *col = find(&header, &(i + 1).to_string())?;
    }
    let width = header.len();

    let mut days = Vec::new();
    for line in lines {
      let line = line?;
      let tokens: Vec<&str> = line.split_whitespace().collect();
      if tokens.is_empty() {
        continue;
      }
      if tokens.len() < width {
        return Err(anyhow::anyhow!("Short K-index row: {:?}", line));
      }
      let date = NaiveDate::parse_from_str(tokens[date_col], "%d-%b-%y")
        .map_err(|e| anyhow::anyhow!("Invalid date {:?}: {}", tokens[date_col], e))?;
      let parse = |col: usize| -> anyhow::Result<i32> {
        tokens[col]
          .parse()
          .map_err(|e| anyhow::anyhow!("Invalid K value {:?} on {}: {}", tokens[col], date, e))
      };
      let mut k = [0; 8];
      for (value, col) in k.iter_mut().zip(k_cols) {
        *value = parse(col)?;
      }
      days.push(KIndexDay {
        date,
        k,
        sk: parse(sk_col)?,
      });
    }
    debug!("Parsed {} K-index days", days.len());
    Ok(Self { days })
  }

  pub fn dates(&self, activity: Activity) -> Vec<NaiveDate> {
    self
      .days
      .iter()
      .filter(|d| activity.matches(&d.k))
      .map(|d| d.date)
      .collect()
  }
}

#[test]
fn classifies_activity() {
  let quiet = [0, 1, 2, 2, 1, 0, 1, 2];
  let low = [1, 3, 2, 2, 1, 0, 1, 2];
  let medium = [1, 3, 4, 2, 1, 0, 1, 2];
  let storm = [1, 3, 4, 5, 1, 0, 1, 2];
  let heavy = [1, 3, 4, 5, 8, 0, 1, 2];
  assert!(Activity::Quiet.matches(&quiet));
  assert!(!Activity::Low.matches(&quiet));
  assert!(Activity::Low.matches(&low));
  assert!(!Activity::Quiet.matches(&low));
  assert!(Activity::Medium.matches(&medium));
  assert!(!Activity::Low.matches(&medium));
  assert!(Activity::Storm.matches(&storm));
  assert!(!Activity::Medium.matches(&storm));
  assert!(Activity::HeavyStorm.matches(&heavy));
  assert!(!Activity::Storm.matches(&heavy));
  // a 6 fails the storm bound and falls short of heavy storm
  assert!(Activity::ALL.iter().all(|a| !a.matches(&[6, 0, 0, 0, 0, 0, 0, 0])));
}

#[test]
fn parses_table_and_selects_dates() -> anyhow::Result<()> {
  let table = "\
Petropavlovsk-Kamchatsky K indices
DA-MON-YR  DAY#  1  2  3  4  5  6  7  8  SK
06-Sep-17  249   1  1  2  1  0  1  2  2  10
07-Sep-17  250   2  3  3  4  5  4  3  3  27
08-Sep-17  251   7  8  6  5  4  3  3  2  38

09-Sep-17  252   2  2  3  2  1  1  2  1  14
";
  let k = KIndexTable::parse(table.as_bytes())?;
  assert_eq!(k.days.len(), 4);
  assert_eq!(k.days[1].sk, 27);
  let date = |d| NaiveDate::from_ymd_opt(2017, 9, d).ok_or(anyhow::anyhow!("date"));
  assert_eq!(k.dates(Activity::Quiet), vec![date(6)?]);
  assert_eq!(k.dates(Activity::Low), vec![date(9)?]);
  assert_eq!(k.dates(Activity::Storm), vec![date(7)?]);
  assert_eq!(k.dates(Activity::HeavyStorm), vec![date(8)?]);
  assert!(k.dates(Activity::Medium).is_empty());
  assert_eq!(k.days[2].classify(), vec![Activity::HeavyStorm]);
  Ok(())
}

#[test]
fn rejects_table_without_header() {
  assert!(KIndexTable::parse("01-Jan-17 1 1 1 1 1 1 1 1 1 8\n".as_bytes()).is_err());
}
