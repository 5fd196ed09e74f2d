use chrono::{Datelike, NaiveDate};
use futures::StreamExt;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub const GIN_URL: &str = "https://imag-data.bgs.ac.uk/GIN_V1/GINServices";
pub const DEFAULT_RETRIES: usize = 4;
pub const COUNTER_FILE: &str = "counter.dat";

fn default_samples_per_day() -> u32 {
  1440
}

fn default_orientation() -> String {
  "HDZF".to_string()
}

fn default_publication_state() -> String {
  "adj-or-rep".to_string()
}

/// One IAGA-2002 GetData query against the Edinburgh GIN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GinRequest {
  pub observatory: String,
  pub start_date: NaiveDate,
  pub duration_days: u32,
  #[serde(default = "default_samples_per_day")]
  pub samples_per_day: u32,
  #[serde(default = "default_orientation")]
  pub orientation: String,
  #[serde(default = "default_publication_state")]
  pub publication_state: String,
}

impl GinRequest {
  pub fn new(observatory: &str, start_date: NaiveDate, duration_days: u32) -> Self {
    Self {
      observatory: observatory.to_string(),
      start_date,
      duration_days,
      samples_per_day: default_samples_per_day(),
      orientation: default_orientation(),
      publication_state: default_publication_state(),
    }
  }

  pub fn url(&self) -> String {
    format!(
      "{}?Request=GetData&format=IAGA2002&testObsys=0&observatoryIagaCode={}&samplesPerDay={}&orientation={}&publicationState={}&recordTermination=UNIX&dataStartDate={}&dataDuration={}",
      GIN_URL,
      self.observatory.to_uppercase(),
      self.samples_per_day,
      self.orientation,
      self.publication_state,
      self.start_date.format("%Y-%m-%d"),
      self.duration_days
    )
  }

  fn whole_year(&self) -> bool {
    let year = self.start_date.year();
    let days = if NaiveDate::from_ymd_opt(year, 2, 29).is_some() {
      366
    } else {
      365
    };
    self.start_date.ordinal() == 1 && self.duration_days == days
  }

  /// Name before the data type letter is inserted, e.g. `pet20170907min.min`.
  pub fn file_name(&self) -> String {
    let code = self.observatory.to_lowercase();
    if self.duration_days <= 1 {
      format!("{}{}min.min", code, self.start_date.format("%Y%m%d"))
    } else if self.whole_year() {
      format!("{}{}min.min", code, self.start_date.year())
    } else {
      let end = self.start_date + chrono::Duration::days(self.duration_days as i64 - 1);
      format!(
        "{}{}_{}min.min",
        code,
        self.start_date.format("%Y%m%d"),
        end.format("%Y%m%d")
      )
    }
  }

  /// `{year}/{CODE}` under `dir`.
  pub fn folder(&self, dir: &Path) -> PathBuf {
    dir
      .join(self.start_date.year().to_string())
      .join(self.observatory.to_uppercase())
  }

  pub fn local_file(&self, dir: &Path) -> PathBuf {
    self.folder(dir).join(self.file_name())
  }
}

/// Credentials and proxy for the GIN, read from `GIN_USERNAME`, `GIN_PASSWORD` and `GIN_PROXY`.
#[derive(Debug, Clone, Default)]
pub struct GinAuth {
  pub username: Option<String>,
  pub password: Option<String>,
  pub proxy: Option<String>,
}

impl GinAuth {
  pub fn from_env() -> Self {
    let var = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
    Self {
      username: var("GIN_USERNAME"),
      password: var("GIN_PASSWORD"),
      proxy: var("GIN_PROXY"),
    }
  }

  pub fn client(&self) -> anyhow::Result<Client> {
    let mut builder = Client::builder();
    if let Some(proxy) = &self.proxy {
      builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
  }
}

async fn fetch(client: &Client, auth: &GinAuth, url: &str, local_file: &Path) -> anyhow::Result<()> {
  let mut req = client.get(url);
  if let Some(user) = &auth.username {
    req = req.basic_auth(user, auth.password.as_ref());
  }
  let res = req.send().await?.error_for_status()?;
  let mut file = tokio::fs::File::create(local_file).await?;
  let mut stream = res.bytes_stream();
  while let Some(chunk) = stream.next().await {
    file.write_all(&chunk?).await?;
  }
  file.flush().await?;
  Ok(())
}

/// Lowercase data type letter from the last ` Data Type` header record, if alphabetic.
pub fn read_data_type(contents: &str) -> Option<char> {
  contents
    .lines()
    .filter(|l| l.starts_with(" Data Type"))
    .last()
    .and_then(|l| l.chars().nth(24))
    .map(|c| c.to_ascii_lowercase())
    .filter(|c| c.is_ascii_alphabetic())
}

/// Insert `data_type` before the last 7 characters of the file name.
pub fn typed_file_name(path: &Path, data_type: char) -> Option<PathBuf> {
  let name = path.file_name()?.to_str()?;
  let split = name.len().checked_sub(7)?;
  let (stem, suffix) = (name.get(..split)?, name.get(split..)?);
  Some(path.with_file_name(format!("{}{}{}", stem, data_type, suffix)))
}

async fn remove_if_exists(path: &Path) -> anyhow::Result<()> {
  match tokio::fs::remove_file(path).await {
    Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(anyhow::anyhow!(
      "Unable to remove {}: {}",
      path.display(),
      e
    )),
    _ => Ok(()),
  }
}

/// Stream `url` into `local_file` with up to `retries` attempts, then rename it by data type.
/// Returns the final path.
pub async fn download(
  client: &Client,
  auth: &GinAuth,
  url: &str,
  local_file: &Path,
  retries: usize,
) -> anyhow::Result<PathBuf> {
  remove_if_exists(local_file).await?;

  let mut attempt = 0;
  loop {
    attempt += 1;
    match fetch(client, auth, url, local_file).await {
      Ok(()) => break,
      Err(e) if attempt < retries.max(1) => {
        warn!("Download attempt {} of {} failed: {}", attempt, retries, e)
      }
      Err(e) => {
        return Err(anyhow::anyhow!(
          "Cannot download {}: {}",
          local_file.display(),
          e
        ))
      }
    }
  }

  let contents = tokio::fs::read_to_string(local_file).await.unwrap_or_default();
  let renamed = read_data_type(&contents).and_then(|dt| typed_file_name(local_file, dt));
  match renamed {
    Some(new_file) => {
      remove_if_exists(&new_file).await?;
      match tokio::fs::rename(local_file, &new_file).await {
        Ok(()) => Ok(new_file),
        Err(e) => {
          warn!(
            "Unable to rename {} to {}: {}",
            local_file.display(),
            new_file.display(),
            e
          );
          Ok(local_file.to_path_buf())
        }
      }
    }
    None => {
      warn!(
        "Unable to determine data type for renaming of {}",
        local_file.display()
      );
      Ok(local_file.to_path_buf())
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
  CreateDir(PathBuf),
  Download { url: String, local_file: PathBuf },
}

/// Ordered batch of folder creations and downloads that resumes where a failed run stopped.
/// Progress lives in `counter.dat` under `dir` and is removed once every operation succeeded.
pub struct DownloadPlan {
  pub dir: PathBuf,
  pub requests: Vec<GinRequest>,
  pub retries: usize,
}

impl DownloadPlan {
  pub fn new(dir: PathBuf, requests: Vec<GinRequest>) -> Self {
    Self {
      dir,
      requests,
      retries: DEFAULT_RETRIES,
    }
  }

  pub fn counter_file(&self) -> PathBuf {
    self.dir.join(COUNTER_FILE)
  }

  /// Folders first, in order of first use, then one download per request.
  pub fn operations(&self) -> Vec<Operation> {
    let mut folders: Vec<PathBuf> = Vec::new();
    for req in &self.requests {
      let folder = req.folder(&self.dir);
      if !folders.contains(&folder) {
        folders.push(folder);
      }
    }
    folders
      .into_iter()
      .map(Operation::CreateDir)
      .chain(self.requests.iter().map(|req| Operation::Download {
        url: req.url(),
        local_file: req.local_file(&self.dir),
      }))
      .collect()
  }

  /// Completed operation count from a previous run, 0 when starting fresh.
  pub async fn progress(&self) -> usize {
    match tokio::fs::read_to_string(self.counter_file()).await {
      Ok(s) => match s.trim().parse() {
        Ok(count) => {
          info!("Resuming download after previous failure at operation {}", count);
          count
        }
        Err(_) => 0,
      },
      Err(_) => 0,
    }
  }

  async fn advance(&self, count: usize) -> anyhow::Result<usize> {
    let count = count + 1;
    tokio::fs::write(self.counter_file(), count.to_string()).await?;
    Ok(count)
  }

  /// Run every pending operation, returning the files downloaded by this run.
  pub async fn run(&self, client: &Client, auth: &GinAuth) -> anyhow::Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(&self.dir).await?;
    let ops = self.operations();
    let n_downloads = self.requests.len().max(1);
    let n_folders = ops.len() - self.requests.len();
    let mut count = self.progress().await;
    let mut downloaded = Vec::new();

    for (op_number, op) in ops.iter().enumerate() {
      if op_number < count {
        debug!("Skipping completed operation {}", op_number);
        continue;
      }
      match op {
        Operation::CreateDir(folder) => {
          if op_number == 0 {
            info!("Creating directories...");
          }
          tokio::fs::create_dir_all(folder)
            .await
            .map_err(|e| anyhow::anyhow!("Unable to create {}: {}", folder.display(), e))?;
        }
        Operation::Download { url, local_file } => {
          info!(
            "{}% - downloading file: {}",
            (op_number - n_folders) * 100 / n_downloads,
            local_file.display()
          );
          downloaded.push(download(client, auth, url, local_file, self.retries).await?);
        }
      }
      count = self.advance(count).await?;
    }

    remove_if_exists(&self.counter_file()).await?;
    Ok(downloaded)
  }
}

#[test]
fn builds_gin_url() -> anyhow::Result<()> {
  let start = NaiveDate::from_ymd_opt(2017, 1, 1).ok_or(anyhow::anyhow!("date"))?;
  let req = GinRequest::new("pet", start, 365);
  assert_eq!(
    req.url(),
    "https://imag-data.bgs.ac.uk/GIN_V1/GINServices?Request=GetData&format=IAGA2002&testObsys=0&observatoryIagaCode=PET&samplesPerDay=1440&orientation=HDZF&publicationState=adj-or-rep&recordTermination=UNIX&dataStartDate=2017-01-01&dataDuration=365"
  );
  Ok(())
}

#[test]
fn names_local_files() -> anyhow::Result<()> {
  let date = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).ok_or(anyhow::anyhow!("date"));
  let dir = Path::new("data");
  assert_eq!(
    GinRequest::new("PET", date(2017, 1, 1)?, 365).local_file(dir),
    PathBuf::from("data/2017/PET/pet2017min.min")
  );
  assert_eq!(
    GinRequest::new("PET", date(2017, 9, 8)?, 1).file_name(),
    "pet20170908min.min"
  );
  assert_eq!(
    GinRequest::new("PET", date(2017, 9, 6)?, 3).file_name(),
    "pet20170906_20170908min.min"
  );
  // leap year needs 366 days to count as the whole year
  assert_eq!(
    GinRequest::new("PET", date(2020, 1, 1)?, 365).file_name(),
    "pet20200101_20201230min.min"
  );
  Ok(())
}

#[test]
fn renames_by_data_type() {
  let header = " Format                 IAGA-2002                                    |\n Data Type              Definitive                                   |\n";
  assert_eq!(read_data_type(header), Some('d'));
  assert_eq!(read_data_type(" Data Type              1-second  |\n"), None);
  assert_eq!(read_data_type("DATE TIME\n"), None);
  assert_eq!(
    typed_file_name(Path::new("2017/PET/pet2017min.min"), 'd'),
    Some(PathBuf::from("2017/PET/pet2017dmin.min"))
  );
  assert_eq!(typed_file_name(Path::new("a.min"), 'd'), None);
}

#[tokio::test]
async fn plan_orders_and_resumes() -> anyhow::Result<()> {
  let dir = std::env::temp_dir().join(format!("wavesys_gin_plan_{}", std::process::id()));
  let start = NaiveDate::from_ymd_opt(2017, 9, 7).ok_or(anyhow::anyhow!("date"))?;
  let plan = DownloadPlan::new(
    dir.clone(),
    vec![
      GinRequest::new("PET", start, 1),
      GinRequest::new("PET", start.succ_opt().ok_or(anyhow::anyhow!("date"))?, 1),
    ],
  );
  let ops = plan.operations();
  assert_eq!(ops.len(), 3);
  assert_eq!(ops[0], Operation::CreateDir(dir.join("2017").join("PET")));

  // every operation already done: nothing is fetched and the counter is cleared
  tokio::fs::create_dir_all(&dir).await?;
  tokio::fs::write(plan.counter_file(), "3").await?;
  assert_eq!(plan.progress().await, 3);
  let downloaded = plan.run(&Client::new(), &GinAuth::default()).await?;
  assert!(downloaded.is_empty());
  assert!(!plan.counter_file().exists());
  assert_eq!(plan.progress().await, 0);

  tokio::fs::remove_dir_all(&dir).await?;
  Ok(())
}

/// Answer one HTTP request on `listener` with a canned response.
#[cfg(test)]
async fn respond_once(listener: &tokio::net::TcpListener, response: String) -> anyhow::Result<()> {
  use tokio::io::AsyncReadExt;
  let (mut socket, _) = listener.accept().await?;
  let mut buf = vec![0u8; 8192];
  let mut read = 0;
  while read < buf.len() && !buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
    let n = socket.read(&mut buf[read..]).await?;
    if n == 0 {
      break;
    }
    read += n;
  }
  socket.write_all(response.as_bytes()).await?;
  socket.shutdown().await?;
  Ok(())
}

#[tokio::test]
async fn download_retries_then_renames() -> anyhow::Result<()> {
  let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
  let url = format!("http://{}/GINServices", listener.local_addr()?);
  let body = " Format                 IAGA-2002                                    |\n Data Type              Definitive                                   |\n";
  let responses = vec![
    "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
      .to_string(),
    format!(
      "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
      body.len(),
      body
    ),
  ];
  let server = tokio::spawn(async move {
    for response in responses {
      respond_once(&listener, response).await?;
    }
    Ok::<_, anyhow::Error>(())
  });

  let dir = std::env::temp_dir().join(format!("wavesys_gin_download_{}", std::process::id()));
  tokio::fs::create_dir_all(&dir).await?;
  let local_file = dir.join("pet2017min.min");
  let client = Client::builder().no_proxy().build()?;
  let saved = download(&client, &GinAuth::default(), &url, &local_file, 2).await?;
  server.await??;

  assert_eq!(saved, dir.join("pet2017dmin.min"));
  assert!(!local_file.exists());
  assert_eq!(tokio::fs::read_to_string(&saved).await?, body);

  tokio::fs::remove_dir_all(&dir).await?;
  Ok(())
}
