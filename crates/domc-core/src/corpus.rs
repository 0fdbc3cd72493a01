use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::{Path, PathBuf},
};

use miette::{Diagnostic, SourceSpan};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use thiserror::Error;

use crate::node::{DomRecord, Node};

/// Default bound on how many levels deep a page's DOM may be.
pub const MAX_DOM_DEPTH: usize = 1024;

#[derive(Debug, Error, Diagnostic)]
pub enum CorpusError {
    #[error("Failed to open corpus file {}", path.display())]
    #[diagnostic(code(domc::corpus::open))]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read corpus: {0}")]
    #[diagnostic(code(domc::corpus::io))]
    Io(#[from] io::Error),

    #[error("Invalid record on line {line}: {message}")]
    #[diagnostic(
        code(domc::corpus::parse),
        help("Each line must be a JSON object with a string `url` and a `dom` tree.")
    )]
    Parse {
        line: usize,
        message: String,
        #[source_code]
        src: String,
        #[label("here")]
        span: SourceSpan,
    },

    #[error("DOM of `{url}` on line {line} is {depth} levels deep, the limit is {max_depth}")]
    #[diagnostic(
        code(domc::corpus::too_deep),
        help("Raise the depth limit if the page is genuine.")
    )]
    TooDeep {
        url: String,
        line: usize,
        depth: usize,
        max_depth: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorpusOptions {
    /// Pages whose DOM is deeper than this abort the load.
    pub max_depth: usize,
}

impl Default for CorpusOptions {
    fn default() -> Self {
        Self {
            max_depth: MAX_DOM_DEPTH,
        }
    }
}

/// One crawled page.
#[derive(Debug)]
pub struct Page {
    pub url: String,
    pub dom: Node,
}

impl AsRef<Node> for Page {
    fn as_ref(&self) -> &Node {
        &self.dom
    }
}

#[derive(Debug, Deserialize)]
struct Entry {
    url: String,
    #[serde(default)]
    dom: Option<DomRecord>,
}

/// Reads line-delimited JSON page records with the default options.
pub fn read_corpus(reader: impl BufRead) -> Result<Vec<Page>, CorpusError> {
    read_corpus_with(reader, &CorpusOptions::default())
}

/// Reads line-delimited JSON page records, keeping their order.
///
/// Blank lines are ignored and records without a `dom` are skipped. A record
/// repeating an earlier url replaces it in place. Any unreadable line or DOM
/// deeper than `options.max_depth` aborts the whole load.
pub fn read_corpus_with(
    reader: impl BufRead,
    options: &CorpusOptions,
) -> Result<Vec<Page>, CorpusError> {
    let mut pages: Vec<Page> = Vec::new();
    let mut seen: FxHashMap<String, (usize, usize)> = FxHashMap::default();
    let mut skipped = 0usize;

    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = index + 1;

        if line.trim().is_empty() {
            continue;
        }

        let entry = parse_entry(&line).map_err(|e| parse_error(line_number, &line, e))?;

        let Some(dom) = entry.dom else {
            tracing::warn!(line = line_number, url = %entry.url, "skipping record without a dom");
            skipped += 1;
            continue;
        };

        let depth = dom.depth();
        if depth > options.max_depth {
            dismantle(dom);
            return Err(CorpusError::TooDeep {
                url: entry.url,
                line: line_number,
                depth,
                max_depth: options.max_depth,
            });
        }

        let page = Page {
            url: entry.url,
            dom: Node::from_record(dom),
        };

        match seen.get(&page.url) {
            Some(&(position, first_line)) => {
                tracing::warn!(
                    line = line_number,
                    first_line,
                    url = %page.url,
                    "replacing earlier record with the same url"
                );
                pages[position] = page;
            }
            None => {
                seen.insert(page.url.clone(), (pages.len(), line_number));
                pages.push(page);
            }
        }
    }

    tracing::debug!(pages = pages.len(), skipped, "corpus loaded");
    Ok(pages)
}

pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<Page>, CorpusError> {
    load_corpus_with(path, &CorpusOptions::default())
}

pub fn load_corpus_with(
    path: impl AsRef<Path>,
    options: &CorpusOptions,
) -> Result<Vec<Page>, CorpusError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| CorpusError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    read_corpus_with(BufReader::new(file), options)
}

/// Parses one record, growing the stack as needed so nesting depth is only
/// bounded by `CorpusOptions::max_depth`.
fn parse_entry(line: &str) -> Result<Entry, serde_json::Error> {
    let mut json = serde_json::Deserializer::from_str(line);
    json.disable_recursion_limit();

    let entry = Entry::deserialize(serde_stacker::Deserializer::new(&mut json))?;
    json.end()?;

    Ok(entry)
}

/// Frees a record tree level by level instead of through recursive drops.
fn dismantle(record: DomRecord) {
    let mut stack = vec![record];

    while let Some(mut record) = stack.pop() {
        stack.extend(record.children.take().unwrap_or_default());
    }
}

fn parse_error(line: usize, src: &str, err: serde_json::Error) -> CorpusError {
    let offset = err.column().saturating_sub(1).min(src.len());

    CorpusError::Parse {
        line,
        message: err.to_string(),
        src: src.to_string(),
        span: (offset, 0).into(),
    }
}
