//! Streaming path transform for the server-to-client wire stream.
//!
//! Module rows carry the source path of a client module:
//!
//! ```text
//! 1:I["/components/Counter.tsx",["default"],"default"]
//! ```
//!
//! The path is replaced by the hashed bundle path recorded in the snapshot.
//! Input arrives in arbitrary chunks; only complete lines are rewritten, so
//! the result does not depend on where chunks are split.

use regex::bytes::Regex;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use crate::orchestrator::Snapshot;
use crate::utils::path::canonical_id;

/// `:I[` followed by a JSON string; group 1 is the raw string body.
static MODULE_ROW: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?-u):I\["((?:[^"\\]|\\.)*)""#).expect("valid regex"));

/// Incremental line rewriter.
#[derive(Debug)]
pub struct PathRewriter {
    snapshot: Arc<Snapshot>,
    root: PathBuf,
    /// Trailing partial line from previous chunks.
    pending: Vec<u8>,
}

impl PathRewriter {
    pub fn new(snapshot: Arc<Snapshot>, root: &Path) -> Self {
        Self {
            snapshot,
            root: root.to_path_buf(),
            pending: Vec::new(),
        }
    }

    /// Feed a chunk; returns the rewritten complete lines it finished.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<u8> {
        let start = self.pending.len();
        self.pending.extend_from_slice(chunk);
        // Earlier bytes were already searched when they arrived
        let Some(last) = chunk.iter().rposition(|&b| b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(start + last + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        let mut out = Vec::with_capacity(complete.len());
        for line in complete.split_inclusive(|&b| b == b'\n') {
            self.rewrite_line(line, &mut out);
        }
        out
    }

    /// End of stream: the buffered partial line goes through the same rewrite.
    pub fn finish(&mut self) -> Vec<u8> {
        let line = std::mem::take(&mut self.pending);
        let mut out = Vec::with_capacity(line.len());
        self.rewrite_line(&line, &mut out);
        out
    }

    fn rewrite_line(&self, line: &[u8], out: &mut Vec<u8>) {
        let mut copied = 0;
        for caps in MODULE_ROW.captures_iter(line) {
            let Some(body) = caps.get(1) else { continue };
            let Some(output) = self.lookup(body.as_bytes()) else {
                continue;
            };
            // Replace the quoted string, quotes included
            out.extend_from_slice(&line[copied..body.start() - 1]);
            out.extend_from_slice(serde_json::Value::from(output).to_string().as_bytes());
            copied = body.end() + 1;
        }
        out.extend_from_slice(&line[copied..]);
    }

    fn lookup(&self, body: &[u8]) -> Option<&str> {
        let mut quoted = Vec::with_capacity(body.len() + 2);
        quoted.push(b'"');
        quoted.extend_from_slice(body);
        quoted.push(b'"');
        let raw: String = serde_json::from_slice(&quoted).ok()?;
        self.snapshot.output_for(&canonical_id(&raw, &self.root))
    }
}

const READ_CHUNK: usize = 8 * 1024;

/// [`Read`] adapter applying a [`PathRewriter`] to everything read.
pub struct RewriteReader<R> {
    inner: R,
    rewriter: PathRewriter,
    buf: Vec<u8>,
    pos: usize,
    done: bool,
}

impl<R: Read> RewriteReader<R> {
    pub fn new(inner: R, rewriter: PathRewriter) -> Self {
        Self {
            inner,
            rewriter,
            buf: Vec::new(),
            pos: 0,
            done: false,
        }
    }
}

impl<R: Read> Read for RewriteReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        while self.pos >= self.buf.len() {
            if self.done {
                return Ok(0);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let n = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            self.buf = if n == 0 {
                self.done = true;
                self.rewriter.finish()
            } else {
                self.rewriter.push(&chunk[..n])
            };
            self.pos = 0;
        }

        let n = out.len().min(self.buf.len() - self.pos);
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
