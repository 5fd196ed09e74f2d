use crate::{Data, Dataset, PipelineError};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use std::io::BufRead;
use std::path::Path;

/// IAGA-2002 sentinel for a missing sample.
pub const MISSING: f64 = 99999.0;
/// IAGA-2002 sentinel for an unrecorded element.
pub const UNRECORDED: f64 = 88888.0;

const KEY_END: usize = 24;
const VALUE_END: usize = 69;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IagaHeader {
  pub iaga_code: String,
  pub data_type: String,
  /// Every header record in file order, keyword then value.
  pub fields: Vec<(String, String)>,
}

impl IagaHeader {
  pub fn get(&self, key: &str) -> Option<&str> {
    self
      .fields
      .iter()
      .find(|(k, _)| k.eq_ignore_ascii_case(key))
      .map(|(_, v)| v.as_str())
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IagaRow {
  pub time: NaiveDateTime,
  pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IagaFile {
  pub header: IagaHeader,
  /// Element columns after DATE TIME DOY, e.g. PETH PETD PETZ PETF.
  pub columns: Vec<String>,
  pub rows: Vec<IagaRow>,
}

fn slice(line: &str, start: usize, end: usize) -> &str {
  let end = end.min(line.len());
  line.get(start.min(end)..end).unwrap_or("").trim()
}

fn parse_value(token: &str) -> anyhow::Result<f64> {
  let value: f64 = token
    .parse()
    .map_err(|e| anyhow::anyhow!("Invalid sample {:?}: {}", token, e))?;
  if value == MISSING || value == UNRECORDED {
    Ok(f64::NAN)
  } else {
    Ok(value)
  }
}

impl IagaFile {
  pub fn read(path: &Path) -> anyhow::Result<Self> {
    let file = std::fs::File::open(path)
      .map_err(|e| anyhow::anyhow!("Failed to open {}: {}", path.display(), e))?;
    let iaga = Self::parse(std::io::BufReader::new(file))?;
    debug!(
      "Read {} rows of {:?} from {}",
      iaga.rows.len(),
      iaga.columns,
      path.display()
    );
    Ok(iaga)
  }

  pub fn parse<R: BufRead>(reader: R) -> anyhow::Result<Self> {
    let mut header = IagaHeader::default();
    let mut columns: Option<Vec<String>> = None;
    let mut rows = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
      let line = line?;
      if line.trim().is_empty() {
        continue;
      }
      if let Some(names) = &columns {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        if tokens.len() < 3 + names.len() {
          return Err(anyhow::anyhow!(
            "Line {} has {} fields, expected {}",
            line_no + 1,
            tokens.len(),
            3 + names.len()
          ));
        }
        let stamp = format!("{} {}", tokens[0], tokens[1]);
        let time = NaiveDateTime::parse_from_str(&stamp, "%Y-%m-%d %H:%M:%S%.f").map_err(|e| {
          anyhow::anyhow!("Invalid timestamp {:?} on line {}: {}", stamp, line_no + 1, e)
        })?;
        let values = tokens[3..3 + names.len()]
          .iter()
          .map(|t| parse_value(t))
          .collect::<anyhow::Result<Vec<f64>>>()?;
        rows.push(IagaRow { time, values });
      } else if line.starts_with("DATE") {
        let names: Vec<String> = line
          .trim_end_matches(|c: char| c == '|' || c.is_whitespace())
          .split_whitespace()
          .skip(3)
          .map(|s| s.to_string())
          .collect();
        if names.is_empty() {
          return Err(anyhow::anyhow!(
            "Column header on line {} names no elements",
            line_no + 1
          ));
        }
        columns = Some(names);
      } else if !line.trim_start().starts_with('#') {
        let key = slice(&line, 0, KEY_END).to_string();
        let value = slice(&line, KEY_END, VALUE_END).to_string();
        match key.to_ascii_uppercase().as_str() {
          "IAGA CODE" => header.iaga_code = value.clone(),
          "DATA TYPE" => header.data_type = value.clone(),
          _ => {}
        }
        header.fields.push((key, value));
      }
    }

    let columns = columns.ok_or_else(|| anyhow::anyhow!("No DATE column header found"))?;
    Ok(Self {
      header,
      columns,
      rows,
    })
  }

  /// Column index of `name`, given either in full (`PETH`) or as the element letter (`H`).
  pub fn column(&self, name: &str) -> anyhow::Result<usize> {
    let qualified = format!("{}{}", self.header.iaga_code, name);
    self
      .columns
      .iter()
      .position(|c| c.eq_ignore_ascii_case(name) || c.eq_ignore_ascii_case(&qualified))
      .ok_or_else(|| anyhow::anyhow!("No component {} in {:?}", name, self.columns))
  }

  fn dataset<'a>(&self, rows: impl Iterator<Item = &'a IagaRow>, col: usize) -> Dataset {
    Dataset::new(
      rows
        .map(|row| Data {
          x: row.time.and_utc().timestamp_millis(),
          y: row.values[col],
        })
        .collect(),
    )
  }

  /// Whole component, x in unix milliseconds.
  pub fn component(&self, name: &str) -> anyhow::Result<Dataset> {
    let col = self.column(name)?;
    Ok(self.dataset(self.rows.iter(), col))
  }

  pub fn day(&self, date: NaiveDate, name: &str) -> anyhow::Result<Dataset> {
    let col = self.column(name)?;
    let data = self.dataset(self.rows.iter().filter(|r| r.time.date() == date), col);
    if data.is_empty() {
      warn!("No {} samples on {}", name, date);
      return Err(PipelineError::EmptySignal("requested day").into());
    }
    let missing = data.y().iter().filter(|y| y.is_nan()).count();
    if missing > 0 {
      warn!("{} of {} {} samples missing on {}", missing, data.len(), name, date);
    }
    Ok(data)
  }

  /// Concatenation of several days in the order given.
  pub fn days(&self, dates: &[NaiveDate], name: &str) -> anyhow::Result<Dataset> {
    let mut out = Dataset::default();
    for date in dates {
      out.extend(self.day(*date, name)?);
    }
    Ok(out)
  }
}

#[cfg(test)]
const SAMPLE: &str = " Format                 IAGA-2002                                    |
 Source of Data         Institute of Cosmophysical Research          |
 Station Name           Paratunka                                    |
 IAGA CODE              PET                                          |
 Data Type              Definitive                                   |
 # sample record for tests                                           |
DATE       TIME         DOY     PETH      PETD      PETZ      PETF   |
2017-09-07 00:00:00.000 250     22346.10  -5.13     45123.40  50401.20
2017-09-07 00:01:00.000 250     22346.90  -5.12     45123.10  88888.00
2017-09-08 00:00:00.000 251     22340.00  -5.10     45120.00  99999.00
";

#[test]
fn parses_header_and_rows() -> anyhow::Result<()> {
  let iaga = IagaFile::parse(SAMPLE.as_bytes())?;
  assert_eq!(iaga.header.iaga_code, "PET");
  assert_eq!(iaga.header.data_type, "Definitive");
  assert_eq!(iaga.header.get("station name"), Some("Paratunka"));
  assert_eq!(iaga.columns, vec!["PETH", "PETD", "PETZ", "PETF"]);
  assert_eq!(iaga.rows.len(), 3);
  assert!(iaga.rows[1].values[3].is_nan());
  assert!(iaga.rows[2].values[3].is_nan());
  Ok(())
}

#[test]
fn selects_days_and_components() -> anyhow::Result<()> {
  let iaga = IagaFile::parse(SAMPLE.as_bytes())?;
  let sept7 = NaiveDate::from_ymd_opt(2017, 9, 7).ok_or(anyhow::anyhow!("date"))?;
  let sept8 = NaiveDate::from_ymd_opt(2017, 9, 8).ok_or(anyhow::anyhow!("date"))?;

  let h = iaga.day(sept7, "H")?;
  assert_eq!(h.y(), vec![22346.10, 22346.90]);
  assert_eq!(h.x()[1] - h.x()[0], 60_000);
  assert_eq!(h.x()[0], 1_504_742_400_000);

  let both = iaga.days(&[sept8, sept7], "PETH")?;
  assert_eq!(both.y(), vec![22340.00, 22346.10, 22346.90]);
  assert_eq!(iaga.component("Z")?.len(), 3);

  assert!(iaga.component("X").is_err());
  let sept9 = NaiveDate::from_ymd_opt(2017, 9, 9).ok_or(anyhow::anyhow!("date"))?;
  let err = iaga.day(sept9, "H").unwrap_err();
  assert_eq!(
    err.downcast_ref::<PipelineError>(),
    Some(&PipelineError::EmptySignal("requested day"))
  );
  Ok(())
}

#[test]
fn rejects_files_without_columns() {
  assert!(IagaFile::parse(" IAGA CODE              PET    |\n".as_bytes()).is_err());
}
