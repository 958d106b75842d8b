//! JSONL reading operations.
//!
//! [`JsonlReader`] reads one JSON value per line with line-number tracking.
//! Blank lines are skipped. The resilient variants keep going past lines
//! that are not UTF-8 or fail to parse and report them as [`Warning`]s.

use crate::error::{Error, Result};
use crate::warning::{Warning, WarningCollector};
use futures::stream::{self, Stream, StreamExt};
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

/// Async reader for JSONL (JSON Lines) data.
///
/// # Examples
///
/// ```no_run
/// use quarry_jsonl::JsonlReader;
/// use tokio::fs::File;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let file = File::open("tickets.jsonl").await?;
/// let mut reader = JsonlReader::new(file);
/// while let Some(row) = reader.read_line::<serde_json::Value>().await? {
///     println!("{row}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct JsonlReader<R> {
    reader: BufReader<R>,
    /// 1-based number of the last physical line read; 0 before any read.
    line_number: usize,
    buf: Vec<u8>,
}

impl<R: AsyncRead + Unpin> JsonlReader<R> {
    /// Creates a new `JsonlReader` wrapping the given async reader.
    #[must_use]
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            buf: Vec::new(),
        }
    }

    /// Returns the number of the last physical line read (blank lines count).
    #[must_use]
    pub fn line_number(&self) -> usize {
        self.line_number
    }

    /// Reads the next non-blank line and deserializes it.
    ///
    /// Returns `Ok(None)` at end of input. A line that fails to decode or
    /// parse is consumed, so the next call continues after it.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the underlying reader fails
    /// - [`Error::Encoding`] if the line is not UTF-8
    /// - [`Error::Parse`] if the line is not valid JSON for `T`
    pub async fn read_line<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        if !self.advance_to_non_blank().await? {
            return Ok(None);
        }
        let line_number = self.line_number;
        let text = std::str::from_utf8(&self.buf).map_err(|source| Error::Encoding {
            line_number,
            source,
        })?;
        serde_json::from_str(text.trim())
            .map(Some)
            .map_err(|source| Error::Parse {
                line_number,
                source,
            })
    }

    /// Fills `buf` with the next non-blank line; `false` at end of input.
    async fn advance_to_non_blank(&mut self) -> Result<bool> {
        loop {
            self.buf.clear();
            let read = self.reader.read_until(b'\n', &mut self.buf).await?;
            if read == 0 {
                return Ok(false);
            }
            self.line_number += 1;
            if !self.buf.trim_ascii().is_empty() {
                return Ok(true);
            }
        }
    }

    /// Converts the reader into a stream of the lines that parse.
    ///
    /// Undecodable lines are recorded in the returned collector as
    /// [`Warning::SkippedLine`] and unparsable ones as
    /// [`Warning::MalformedJson`]. Only I/O errors reach the stream, and
    /// the stream ends after yielding one.
    pub fn stream_resilient<T: DeserializeOwned>(
        self,
    ) -> (impl Stream<Item = Result<T>>, WarningCollector) {
        let warnings = WarningCollector::new();
        let sink = warnings.clone();
        let values = stream::unfold(Some((self, sink)), |state| async move {
            let (mut reader, sink) = state?;
            loop {
                match reader.read_line::<T>().await {
                    Ok(Some(value)) => return Some((Ok(value), Some((reader, sink)))),
                    Ok(None) => return None,
                    Err(Error::Parse {
                        line_number,
                        source,
                    }) => sink.add(Warning::MalformedJson {
                        line_number,
                        error: source.to_string(),
                    }),
                    Err(Error::Encoding {
                        line_number,
                        source,
                    }) => sink.add(Warning::SkippedLine {
                        line_number,
                        reason: format!("invalid UTF-8: {source}"),
                    }),
                    Err(err) => return Some((Err(err), None)),
                }
            }
        });
        (values, warnings)
    }
}

/// Reads an entire JSONL file, skipping lines that fail to decode or parse.
///
/// # Errors
///
/// Returns [`Error::Io`] if the file cannot be opened or read. Bad lines
/// never fail the call; they are returned as warnings.
pub async fn read_jsonl_resilient<T, P>(path: P) -> Result<(Vec<T>, Vec<Warning>)>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = tokio::fs::File::open(path).await?;
    let (stream, warnings) = JsonlReader::new(file).stream_resilient::<T>();
    let mut stream = std::pin::pin!(stream);

    let mut values = Vec::new();
    while let Some(value) = stream.next().await {
        values.push(value?);
    }

    let warnings = warnings.into_warnings();
    for warning in &warnings {
        tracing::debug!(
            path = %path.display(),
            line_number = warning.line_number(),
            kind = warning.kind(),
            "skipping line"
        );
    }
    Ok((values, warnings))
}
