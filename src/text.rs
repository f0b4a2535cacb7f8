//! Text preprocessing and augmentation
//!
//! Plain text files are read as UTF-8. CSV files are parsed and rendered as
//! an aligned table (row index first) so every technique works on text.

use crate::error::{MediaError, Result};
use crate::lexicon::Lexicon;
use crate::modality::Modality;
use crate::pipeline::{rng_from_seed, Pipeline};
use crate::technique::{techniques, TechniqueReport};
use rand::seq::SliceRandom;
use rand::Rng;
use std::path::Path;
use std::sync::Arc;

techniques! {
    pub enum TextPreprocess for Modality::Text {
        Lowercase => "lowercase",
        RemovePunctuation => "remove_punctuation",
        Tokenize => "tokenize",
        RemoveStopwords => "remove_stopwords",
    }
}

techniques! {
    pub enum TextAugment for Modality::Text {
        Synonym => "synonym",
        Insertion => "insertion",
    }
}

#[derive(Debug, Clone)]
pub struct TextConfig {
    pub preview_chars: usize,
    pub csv_preview_rows: usize,
    pub synonym_probability: f64,
    pub insertion_probability: f64,
    pub seed: Option<u64>,
}

impl Default for TextConfig {
    fn default() -> Self {
        Self {
            preview_chars: 1000,
            csv_preview_rows: 5,
            synonym_probability: 0.3,
            insertion_probability: 0.2,
            seed: None,
        }
    }
}

pub struct TextPipeline {
    config: TextConfig,
    lexicon: Arc<Lexicon>,
}

impl TextPipeline {
    pub fn new(config: TextConfig, lexicon: Arc<Lexicon>) -> Self {
        Self { config, lexicon }
    }

    /// Read a text or CSV file as a single string
    pub fn load(&self, path: &Path) -> Result<String> {
        if is_csv(path) {
            read_csv_table(path, None)
        } else {
            std::fs::read_to_string(path).map_err(|e| MediaError::load(path, e))
        }
    }

    fn remove_stopwords(&self, text: &str) -> String {
        tokenize(&text.to_lowercase())
            .into_iter()
            .filter(|token| !self.lexicon.is_stopword(token))
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn replace_synonyms(&self, words: &[&str], rng: &mut impl Rng) -> String {
        words
            .iter()
            .map(|&word| {
                if rng.gen::<f64>() < self.config.synonym_probability {
                    if let Some(synonym) = self.lexicon.synonyms(word).choose(rng) {
                        return synonym.clone();
                    }
                }
                word.to_string()
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    fn insert_words(&self, words: &[&str], rng: &mut impl Rng) -> String {
        let mut augmented: Vec<&str> = words.to_vec();
        // Indices walk the original length while the vector grows
        for i in 0..words.len() {
            if rng.gen::<f64>() < self.config.insertion_probability {
                if let Some(&word) = words.choose(rng) {
                    augmented.insert(i, word);
                }
            }
        }
        augmented.join(" ")
    }
}

impl Pipeline for TextPipeline {
    type Process = TextPreprocess;
    type Augment = TextAugment;

    const MODALITY: Modality = Modality::Text;

    fn preview(&self, path: &Path) -> Result<String> {
        if is_csv(path) {
            return read_csv_table(path, Some(self.config.csv_preview_rows));
        }
        let text = std::fs::read_to_string(path).map_err(|e| MediaError::load(path, e))?;
        Ok(text.chars().take(self.config.preview_chars).collect())
    }

    fn process(&self, path: &Path, techniques: &[TextPreprocess]) -> Result<TechniqueReport> {
        let text = self.load(path)?;

        Ok(TechniqueReport::collect(techniques, |technique| {
            Ok(match technique {
                TextPreprocess::Lowercase => text.to_lowercase(),
                TextPreprocess::RemovePunctuation => remove_punctuation(&text),
                TextPreprocess::Tokenize => tokenize(&text).join(" "),
                TextPreprocess::RemoveStopwords => self.remove_stopwords(&text),
            })
        }))
    }

    fn augment(&self, path: &Path, techniques: &[TextAugment]) -> Result<TechniqueReport> {
        // Augmentation works on the raw file text, CSV included
        let text = std::fs::read_to_string(path).map_err(|e| MediaError::load(path, e))?;
        let words: Vec<&str> = text.split_whitespace().collect();
        let mut rng = rng_from_seed(self.config.seed);

        Ok(TechniqueReport::collect(techniques, |technique| {
            Ok(match technique {
                TextAugment::Synonym => self.replace_synonyms(&words, &mut rng),
                TextAugment::Insertion => self.insert_words(&words, &mut rng),
            })
        }))
    }
}

fn is_csv(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

/// Strip ASCII punctuation characters
pub fn remove_punctuation(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_punctuation()).collect()
}

const OPENING: &[char] = &['"', '\'', '`', '(', '[', '{', '<', '$', '#'];
const CLOSING: &[char] = &['.', ',', ';', ':', '!', '?', ')', ']', '}', '>', '"', '\'', '%'];
const CONTRACTIONS: &[&str] = &["n't", "'s", "'re", "'ve", "'ll", "'d", "'m"];

/// Treebank-style word tokenization
///
/// Splits leading brackets/quotes and trailing punctuation off each
/// whitespace-separated chunk, keeps `...` together, separates clitics
/// (`don't` -> `do n't`) and rewrites double quotes as `` and ''.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    for chunk in text.split_whitespace() {
        split_chunk(chunk, &mut tokens);
    }
    tokens
}

fn split_chunk(chunk: &str, tokens: &mut Vec<String>) {
    let mut core = chunk;

    while core.chars().count() > 1 {
        let Some(c) = core.chars().next().filter(|c| OPENING.contains(c)) else { break };
        tokens.push(if c == '"' { "``".to_string() } else { c.to_string() });
        core = &core[c.len_utf8()..];
    }

    let mut trailing: Vec<String> = Vec::new();
    while core.chars().count() > 1 {
        let Some(c) = core.chars().last().filter(|c| CLOSING.contains(c)) else { break };
        core = &core[..core.len() - c.len_utf8()];
        match trailing.last_mut() {
            Some(dots) if c == '.' && dots.chars().all(|d| d == '.') => dots.insert(0, '.'),
            _ => trailing.push(if c == '"' { "''".to_string() } else { c.to_string() }),
        }
    }

    match split_contraction(core) {
        Some((stem, clitic)) => {
            tokens.push(stem.to_string());
            tokens.push(clitic.to_string());
        }
        None if !core.is_empty() => tokens.push(core.to_string()),
        None => {}
    }

    tokens.extend(trailing.into_iter().rev());
}

fn split_contraction(word: &str) -> Option<(&str, &str)> {
    CONTRACTIONS.iter().find_map(|suffix| {
        let idx = word.len().checked_sub(suffix.len())?;
        if idx == 0 || !word.is_char_boundary(idx) {
            return None;
        }
        let (stem, clitic) = word.split_at(idx);
        clitic.eq_ignore_ascii_case(suffix).then_some((stem, clitic))
    })
}

/// Render a CSV file as an aligned table; `limit` keeps only the first rows
fn read_csv_table(path: &Path, limit: Option<usize>) -> Result<String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| MediaError::load(path, e))?;

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| MediaError::load(path, e))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records().take(limit.unwrap_or(usize::MAX)) {
        let record = record.map_err(|e| MediaError::load(path, e))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
    }

    Ok(render_table(&headers, &rows))
}

fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let columns = rows.iter().map(Vec::len).chain([headers.len()]).max().unwrap_or(0);
    let index_width = rows.len().saturating_sub(1).to_string().len();
    let widths: Vec<usize> = (0..columns)
        .map(|col| {
            rows.iter()
                .map(|r| cell(r, col).chars().count())
                .chain([cell(headers, col).chars().count()])
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut lines = Vec::with_capacity(rows.len() + 1);
    let mut header = " ".repeat(index_width);
    for (col, width) in widths.iter().enumerate() {
        header.push_str(&format!("  {:>width$}", cell(headers, col), width = width));
    }
    lines.push(header);

    for (i, row) in rows.iter().enumerate() {
        let mut line = format!("{:<width$}", i, width = index_width);
        for (col, width) in widths.iter().enumerate() {
            line.push_str(&format!("  {:>width$}", cell(row, col), width = width));
        }
        lines.push(line);
    }

    lines.join("\n")
}

fn cell(row: &[String], col: usize) -> &str {
    row.get(col).map(String::as_str).unwrap_or("")
}
