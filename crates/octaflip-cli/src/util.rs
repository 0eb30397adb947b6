use std::{
    fs::{self, File},
    io::{self, BufWriter, StdoutLock, Write as _},
    path::{Path, PathBuf},
};

use anyhow::Context;

use crate::schema::model_file::ModelFile;

#[derive(Debug)]
pub enum Output {
    Stdout {
        writer: StdoutLock<'static>,
    },
    File {
        writer: BufWriter<File>,
        path: PathBuf,
    },
}

impl Output {
    pub fn from_output_path(output_path: Option<PathBuf>) -> anyhow::Result<Self> {
        match output_path {
            Some(path) => Output::open(path),
            None => Ok(Output::stdout()),
        }
    }

    pub fn stdout() -> Self {
        Output::Stdout {
            writer: io::stdout().lock(),
        }
    }

    pub fn open(path: PathBuf) -> anyhow::Result<Self> {
        let file = File::create(&path)
            .with_context(|| format!("Failed to create output file: {}", path.display()))?;
        Ok(Output::File {
            writer: BufWriter::new(file),
            path,
        })
    }

    pub fn display_path(&self) -> String {
        match self {
            Output::Stdout { .. } => "stdout".to_string(),
            Output::File { path, .. } => path.display().to_string(),
        }
    }

    pub fn write_json<T>(&mut self, value: T) -> anyhow::Result<()>
    where
        T: serde::Serialize,
    {
        serde_json::to_writer_pretty(&mut *self, &value)
            .with_context(|| format!("Failed to write JSON to {}", self.display_path()))?;
        writeln!(&mut *self).with_context(|| {
            format!(
                "Failed to write newline after JSON to {}",
                self.display_path()
            )
        })?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }

    /// Writes a generated header through `write` and flushes.
    pub fn write_header<F>(&mut self, write: F) -> anyhow::Result<()>
    where
        F: FnOnce(&mut Self) -> io::Result<()>,
    {
        write(self).with_context(|| format!("Failed to write header to {}", self.display_path()))?;
        self.flush()
            .with_context(|| format!("Failed to flush output to {}", self.display_path()))?;
        Ok(())
    }
}

impl io::Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout { writer } => writer.write(buf),
            Output::File { writer, .. } => writer.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout { writer } => writer.flush(),
            Output::File { writer, .. } => writer.flush(),
        }
    }
}

/// Write `path` through a temporary file next to it, then rename it into place.
///
/// If `write` fails, the temporary file is removed and an existing file at `path` is
/// left untouched.
pub fn replace_file<F>(path: &Path, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut Output) -> anyhow::Result<()>,
{
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let written = Output::open(tmp_path.clone()).and_then(|mut output| write(&mut output));
    if let Err(e) = written {
        fs::remove_file(&tmp_path).ok();
        return Err(e);
    }
    fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace file: {}", path.display()))
}

pub fn replace_json<T>(value: &T, path: &Path) -> anyhow::Result<()>
where
    T: serde::Serialize,
{
    replace_file(path, |output| output.write_json(value))
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Read a file saved by an earlier run, if there is one.
///
/// A missing file is `None`. A file that cannot be read or parsed is reported as a
/// warning and also treated as `None`, so the caller starts from fresh state.
pub fn load_optional<T, P>(file_kind: &str, path: P) -> Option<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    if !path.exists() {
        return None;
    }
    match read_json_file(file_kind, path) {
        Ok(value) => Some(value),
        Err(e) => {
            eprintln!("warning: {e:#}; starting with a fresh {file_kind}");
            None
        }
    }
}

/// Like [`load_optional`], falling back to `T::default()`.
pub fn load_or_default<T, P>(file_kind: &str, path: P) -> T
where
    T: serde::de::DeserializeOwned + Default,
    P: AsRef<Path>,
{
    load_optional(file_kind, path).unwrap_or_default()
}

/// Read a trained model from a JSON file
///
/// # Arguments
///
/// * `path` - Path to the model JSON file
///
/// # Errors
///
/// Returns error if file cannot be opened or parsed
pub fn read_model_file<P>(path: P) -> anyhow::Result<ModelFile>
where
    P: AsRef<Path>,
{
    read_json_file("model", path)
}
