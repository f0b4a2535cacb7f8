//! Stopword list and thesaurus for the text pipeline
//!
//! Loaded once at process start through [`Lexicon::initialize`]; the server
//! checks [`Lexicon::is_ready`] before accepting requests. Nothing here is
//! fetched lazily or at module load.
//!
//! Thesaurus files are plain text, one entry per line:
//!
//! ```text
//! # comments and blank lines are ignored
//! happy,glad,cheerful,content
//! big,large,huge
//! ```
//!
//! Entries from a file are merged over the built-in table.

use crate::error::{MediaError, Result};
use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use tracing::info;

/// Common English stopwords
const ENGLISH_STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
    "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his", "himself",
    "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself", "they", "them",
    "their", "theirs", "themselves", "what", "which", "who", "whom", "this", "that", "that'll",
    "these", "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has",
    "had", "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
    "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below", "to", "from",
    "up", "down", "in", "out", "on", "off", "over", "under", "again", "further", "then", "once",
    "here", "there", "when", "where", "why", "how", "all", "any", "both", "each", "few", "more",
    "most", "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than",
    "too", "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
    "d", "ll", "m", "o", "re", "ve", "y", "ain", "aren", "aren't", "couldn", "couldn't", "didn",
    "didn't", "doesn", "doesn't", "hadn", "hadn't", "hasn", "hasn't", "haven", "haven't", "isn",
    "isn't", "ma", "mightn", "mightn't", "mustn", "mustn't", "needn", "needn't", "shan",
    "shan't", "shouldn", "shouldn't", "wasn", "wasn't", "weren", "weren't", "won", "won't",
    "wouldn", "wouldn't",
];

const BUILTIN_THESAURUS: &[(&str, &[&str])] = &[
    ("happy", &["glad", "cheerful", "content", "joyful"]),
    ("sad", &["unhappy", "sorrowful", "gloomy"]),
    ("big", &["large", "huge", "great"]),
    ("small", &["little", "tiny", "minor"]),
    ("fast", &["quick", "rapid", "speedy"]),
    ("slow", &["sluggish", "unhurried", "gradual"]),
    ("good", &["fine", "well", "beneficial"]),
    ("bad", &["poor", "awful", "harmful"]),
    ("beautiful", &["lovely", "pretty", "attractive"]),
    ("old", &["aged", "elderly", "ancient"]),
    ("new", &["fresh", "novel", "recent"]),
    ("smart", &["clever", "bright", "intelligent"]),
    ("easy", &["simple", "effortless", "light"]),
    ("hard", &["difficult", "tough", "firm"]),
    ("begin", &["start", "commence", "initiate"]),
    ("end", &["finish", "conclusion", "close"]),
    ("make", &["create", "build", "produce"]),
    ("help", &["assist", "aid", "support"]),
    ("show", &["display", "demonstrate", "present"]),
    ("use", &["employ", "utilize", "apply"]),
    ("buy", &["purchase", "acquire", "get"]),
    ("look", &["see", "watch", "observe"]),
    ("say", &["state", "tell", "declare"]),
    ("think", &["believe", "consider", "reckon"]),
    ("walk", &["stroll", "march", "step"]),
    ("run", &["sprint", "dash", "race"]),
    ("eat", &["consume", "devour", "dine"]),
    ("house", &["home", "dwelling", "residence"]),
    ("car", &["auto", "automobile", "machine"]),
    ("dog", &["domestic_dog", "hound", "canine"]),
    ("cat", &["true_cat", "feline", "kitty"]),
    ("child", &["kid", "youngster", "minor"]),
    ("man", &["adult_male", "gentleman", "fellow"]),
    ("woman", &["adult_female", "lady", "female"]),
    ("job", &["occupation", "position", "task"]),
    ("idea", &["thought", "notion", "concept"]),
    ("problem", &["issue", "trouble", "difficulty"]),
    ("answer", &["reply", "response", "solution"]),
    ("quick", &["fast", "speedy", "agile"]),
    ("brown", &["brownish", "chocolate", "umber"]),
    ("fox", &["dodger", "slyboots"]),
    ("jump", &["leap", "spring", "bound"]),
    ("jumps", &["leaps", "springs", "bounds"]),
    ("lazy", &["idle", "slothful", "indolent"]),
    ("data", &["information", "datum"]),
    ("text", &["textual_matter", "schoolbook", "passage"]),
    ("image", &["picture", "figure", "icon"]),
    ("sound", &["audio", "noise", "tone"]),
    ("world", &["universe", "earth", "globe"]),
    ("day", &["twenty-four_hours", "daytime", "daylight"]),
    ("night", &["nighttime", "dark", "evening"]),
    ("word", &["term", "expression", "news"]),
    ("work", &["labor", "employment", "effort"]),
    ("time", &["clip", "period", "moment"]),
    ("people", &["citizenry", "folk", "multitude"]),
];

pub type Thesaurus = HashMap<String, Vec<String>>;

pub struct Lexicon {
    stopwords: HashSet<String>,
    thesaurus: Thesaurus,
}

impl Lexicon {
    /// Built-in stopwords and thesaurus only
    pub fn builtin() -> Self {
        let stopwords = ENGLISH_STOPWORDS.iter().map(|w| w.to_string()).collect();
        let thesaurus = BUILTIN_THESAURUS
            .iter()
            .map(|(word, syns)| (word.to_string(), syns.iter().map(|s| s.to_string()).collect()))
            .collect();
        Self { stopwords, thesaurus }
    }

    /// One-time startup initialization, optionally merging a thesaurus file
    pub fn initialize(thesaurus_path: Option<&Path>) -> Result<Self> {
        let mut lexicon = Self::builtin();

        if let Some(path) = thesaurus_path {
            let file = File::open(path).map_err(|e| MediaError::load(path, e))?;
            let extra = parse_thesaurus(BufReader::new(file))?;
            info!(path = %path.display(), entries = extra.len(), "loaded thesaurus file");
            lexicon.thesaurus.extend(extra);
        }

        info!(
            stopwords = lexicon.stopwords.len(),
            thesaurus_entries = lexicon.thesaurus.len(),
            "lexicon initialized"
        );
        Ok(lexicon)
    }

    pub fn is_ready(&self) -> bool {
        !self.stopwords.is_empty() && !self.thesaurus.is_empty()
    }

    /// Case-folded stopword membership
    pub fn is_stopword(&self, word: &str) -> bool {
        self.stopwords.contains(&word.to_lowercase())
    }

    pub fn synonyms(&self, word: &str) -> &[String] {
        self.thesaurus
            .get(&word.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn stopword_count(&self) -> usize {
        self.stopwords.len()
    }

    pub fn thesaurus_len(&self) -> usize {
        self.thesaurus.len()
    }
}

/// Parse `word,syn1,syn2,...` lines
pub fn parse_thesaurus(reader: impl BufRead) -> Result<Thesaurus> {
    let mut thesaurus = Thesaurus::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split(',').map(str::trim).filter(|f| !f.is_empty());
        let Some(word) = fields.next() else { continue };
        let synonyms: Vec<String> = fields.map(str::to_string).collect();
        if !synonyms.is_empty() {
            thesaurus.entry(word.to_lowercase()).or_default().extend(synonyms);
        }
    }
    Ok(thesaurus)
}
