//! TASS-style XML corpus reader.
//!
//! Each child of the document root is one tweet:
//!
//! ```xml
//! <tweets>
//!   <tweet>
//!     <content>Qué gran día http://t.co/x1</content>
//!     <sentiments>
//!       <polarity><value>P</value></polarity>
//!       <polarity><entity>Rajoy</entity><value>N</value></polarity>
//!     </sentiments>
//!   </tweet>
//! </tweets>
//! ```
//!
//! Only the first `polarity` is the overall label; the others are entity-level.

use std::{
    borrow::Cow,
    fs,
    path::{Path, PathBuf},
};

use once_cell::sync::Lazy;
use regex::Regex;
use roxmltree::{Document, Node};
use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SentoError},
    labels::{to_category, SentimentCategory},
};

static URL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"https?://\S+").expect("URL pattern compiles"));

/// Label marking tweets without an overall polarity.
pub const NO_POLARITY: &str = "NONE";

/// Training text with its overall polarity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabeledExample {
    /// Tweet body with URLs removed.
    pub content: String,
    /// Overall polarity.
    pub polarity: SentimentCategory,
}

/// Reads and parses a corpus file.
pub fn read(path: impl AsRef<Path>) -> Result<Vec<LabeledExample>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path).map_err(|err| SentoError::CorpusFormat {
        path: path.to_path_buf(),
        reason: format!("reading file: {err}"),
    })?;
    parse(&raw, path)
}

/// Parses an in-memory corpus document.
pub fn parse_str(xml: &str) -> Result<Vec<LabeledExample>> {
    parse(xml, Path::new("<memory>"))
}

fn parse(xml: &str, origin: &Path) -> Result<Vec<LabeledExample>> {
    let format_error = |reason: String| SentoError::CorpusFormat {
        path: PathBuf::from(origin),
        reason,
    };
    let document = Document::parse(xml).map_err(|err| format_error(err.to_string()))?;

    let mut examples = Vec::new();
    for (position, entry) in document
        .root_element()
        .children()
        .filter(Node::is_element)
        .enumerate()
    {
        let Some(label) = overall_polarity(entry) else {
            continue;
        };
        if label == NO_POLARITY {
            continue;
        }
        let polarity = to_category(label)
            .map_err(|_| format_error(format!("entry {position}: unknown polarity {label:?}")))?;
        let Some(content) = child(entry, "content").and_then(|node| node.text()) else {
            continue;
        };
        examples.push(LabeledExample {
            content: strip_urls(content).into_owned(),
            polarity,
        });
    }
    Ok(examples)
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    node.children()
        .find(|candidate| candidate.is_element() && candidate.tag_name().name() == name)
}

/// First `sentiments/polarity/value` text, trimmed.
fn overall_polarity<'a>(entry: Node<'a, '_>) -> Option<&'a str> {
    let polarity = child(entry, "sentiments")
        .into_iter()
        .flat_map(|sentiments| sentiments.children())
        .find(|node| node.is_element() && node.tag_name().name() == "polarity")?;
    child(polarity, "value")
        .and_then(|value| value.text())
        .map(str::trim)
}

/// Removes every `http(s)://` link up to the next whitespace. Other text is kept as is.
#[must_use]
pub fn strip_urls(text: &str) -> Cow<'_, str> {
    URL_PATTERN.replace_all(text, "")
}
