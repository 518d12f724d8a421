// Terminology retrieval
//
// House terminology (fandom jargon, greetings) is embedded once into a flat
// inner-product index. Translation requests query it token by token to
// produce either a prompt hint (causal models) or an in-place substitution
// of matched terms (seq2seq models that benefit from canonical input).

pub mod embedding;
pub mod index;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

pub use embedding::{Embedder, OllamaEmbedder};
pub use index::{FlatIpIndex, VectorIndex};

use crate::config::TerminologyConfig;
use crate::error::{ParrotError, Result};
use crate::language::{Direction, Language};

/// Domain used when a language pair has no tag of its own
pub const FALLBACK_DOMAIN: &str = "ko2ja";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerminologyEntry {
    #[serde(alias = "source")]
    pub source_term: String,
    #[serde(alias = "target")]
    pub target_term: String,
    /// Direction tag such as `ko2ja`, or a normalization tag such as `ko2ko`
    pub domain: String,
}

impl TerminologyEntry {
    pub fn new(source_term: &str, target_term: &str, domain: &str) -> Self {
        Self {
            source_term: source_term.to_string(),
            target_term: target_term.to_string(),
            domain: domain.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TermMatch {
    pub source_term: String,
    pub target_term: String,
    pub domain: String,
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetrievalParams {
    pub k: usize,
    pub threshold: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self { k: 5, threshold: 0.7 }
    }
}

#[derive(Debug, Deserialize)]
struct GlossaryFile {
    terms: Vec<TerminologyEntry>,
}

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    index: Box<dyn VectorIndex>,
    entries: Vec<TerminologyEntry>,
    params: RetrievalParams,
    max_hint_terms: usize,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, index: Box<dyn VectorIndex>) -> Self {
        Self {
            embedder,
            index,
            entries: Vec::new(),
            params: RetrievalParams::default(),
            max_hint_terms: 3,
        }
    }

    pub fn with_config(mut self, config: &TerminologyConfig) -> Self {
        self.params = RetrievalParams {
            k: config.top_k,
            threshold: config.threshold,
        };
        self.max_hint_terms = config.max_hint_terms;
        self
    }

    pub fn params(&self) -> RetrievalParams {
        self.params
    }

    pub fn max_hint_terms(&self) -> usize {
        self.max_hint_terms
    }

    pub fn entries(&self) -> &[TerminologyEntry] {
        &self.entries
    }

    /// Embed every source term and rebuild the index from scratch.
    /// An unavailable embedder is fatal here.
    pub async fn load(&mut self, entries: Vec<TerminologyEntry>) -> Result<()> {
        let terms: Vec<String> = entries.iter().map(|e| e.source_term.clone()).collect();
        let mut vectors = self.embedder.encode(&terms).await?;

        if vectors.len() != entries.len() {
            return Err(ParrotError::Terminology(format!(
                "Embedded {} vectors for {} terms",
                vectors.len(),
                entries.len()
            )));
        }

        vectors.iter_mut().for_each(|v| embedding::l2_normalize(v));

        self.index.reset();
        self.entries.clear();
        self.index.add(&vectors)?;
        self.entries = entries;

        info!("Terminology database loaded: {} terms", self.entries.len());
        Ok(())
    }

    /// Ranked matches for the whitespace tokens of `text` (two or more
    /// characters each). Duplicates keep their best score; ties keep
    /// first-seen order.
    pub async fn retrieve(
        &self,
        text: &str,
        domain: Option<&str>,
        k: usize,
        threshold: f32,
    ) -> Result<Vec<TermMatch>> {
        if self.index.is_empty() {
            return Ok(Vec::new());
        }

        let mut tokens: Vec<String> = Vec::new();
        for word in text.split_whitespace() {
            if word.chars().count() >= 2 && !tokens.iter().any(|t| t == word) {
                tokens.push(word.to_string());
            }
        }
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let mut queries = self.embedder.encode(&tokens).await?;
        let mut matches: Vec<TermMatch> = Vec::new();
        let mut positions: HashMap<(String, String, String), usize> = HashMap::new();

        for query in queries.iter_mut() {
            embedding::l2_normalize(query);

            for (score, id) in self.index.search(query, k) {
                let Some(entry) = self.entries.get(id) else {
                    continue;
                };
                if score <= threshold {
                    continue;
                }
                if domain.is_some_and(|d| d != entry.domain) {
                    continue;
                }

                let key = (
                    entry.source_term.clone(),
                    entry.target_term.clone(),
                    entry.domain.clone(),
                );
                match positions.get(&key) {
                    Some(&position) => {
                        if score > matches[position].score {
                            matches[position].score = score;
                        }
                    }
                    None => {
                        positions.insert(key, matches.len());
                        matches.push(TermMatch {
                            source_term: entry.source_term.clone(),
                            target_term: entry.target_term.clone(),
                            domain: entry.domain.clone(),
                            score,
                        });
                    }
                }
            }
        }

        // stable: equal scores stay in first-seen order
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        debug!("Retrieved {} terms for {:?} (domain {:?})", matches.len(), text, domain);
        Ok(matches)
    }

    /// Domain tag for a language pair. The replacement variant names the
    /// same-language normalization domain of the source. Unrecognized pairs
    /// fall back to `ko2ja`.
    pub fn domain_for(source_lang: &str, target_lang: &str, use_replacement: bool) -> String {
        let source = source_lang.parse::<Language>().ok();
        let target = target_lang.parse::<Language>().ok();

        match (source, target, use_replacement) {
            (Some(source), _, true) => Direction::new(source, source).tag(),
            (Some(source), Some(target), false) if source != target => {
                Direction::new(source, target).tag()
            }
            _ => FALLBACK_DOMAIN.to_string(),
        }
    }

    /// Top matches as `'source' → 'target'` pairs, or `text` itself when
    /// nothing matches.
    pub async fn render_hint(&self, text: &str, domain: &str, max_terms: usize) -> Result<String> {
        let matches = self
            .retrieve(text, Some(domain), self.params.k, self.params.threshold)
            .await?;

        if matches.is_empty() {
            return Ok(text.to_string());
        }

        Ok(matches
            .iter()
            .take(max_terms)
            .map(|m| format!("'{}' → '{}'", m.source_term, m.target_term))
            .collect::<Vec<_>>()
            .join(", "))
    }

    /// Substitute every matched source term with its target, in ranking
    /// order. Each substitution runs on the output of the previous one, so
    /// overlapping terms can compound.
    pub async fn replace_terms(&self, text: &str, domain: &str) -> Result<String> {
        let matches = self
            .retrieve(text, Some(domain), self.params.k, self.params.threshold)
            .await?;

        Ok(matches.iter().fold(text.to_string(), |current, m| {
            current.replace(&m.source_term, &m.target_term)
        }))
    }
}

/// Glossary shipped with the service
pub fn builtin_glossary() -> Vec<TerminologyEntry> {
    const KO_JA: &[(&str, &str)] = &[
        ("포카", "フォトカード"),
        ("앨범", "アルバム"),
        ("콘서트", "コンサート"),
        ("팬미팅", "ファンミーティング"),
        ("사인회", "サイン会"),
        ("굿즈", "グッズ"),
        ("덕질", "推し活"),
        ("최애", "推し"),
        ("본진", "本命"),
        ("부캐", "副垢"),
        ("안녕", "こんにちは"),
        ("감사합니다", "ありがとうございます"),
        ("미안해", "ごめん"),
        ("사랑해", "愛してる"),
    ];
    const KO_KO: &[(&str, &str)] = &[
        ("포카", "포토카드"),
        ("팬미", "팬미팅"),
        ("덕질", "팬 활동"),
        ("최애", "가장 좋아하는 멤버"),
        ("본진", "가장 좋아하는 그룹"),
        ("부캐", "부계정"),
    ];
    const JA_JA: &[(&str, &str)] = &[
        ("トレカ", "トレーディングカード"),
        ("推し活", "ファン活動"),
    ];

    let mut entries = Vec::new();
    for (ko, ja) in KO_JA {
        entries.push(TerminologyEntry::new(ko, ja, "ko2ja"));
    }
    for (ko, ja) in KO_JA {
        entries.push(TerminologyEntry::new(ja, ko, "ja2ko"));
    }
    for (slang, canonical) in KO_KO {
        entries.push(TerminologyEntry::new(slang, canonical, "ko2ko"));
    }
    for (slang, canonical) in JA_JA {
        entries.push(TerminologyEntry::new(slang, canonical, "ja2ja"));
    }
    entries
}

/// Read `[[terms]]` tables (`source`, `target`, `domain`) from a TOML file
pub fn load_glossary_file<P: AsRef<Path>>(path: P) -> Result<Vec<TerminologyEntry>> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| {
        ParrotError::Terminology(format!("Failed to read glossary {}: {}", path.display(), e))
    })?;

    let glossary: GlossaryFile = toml::from_str(&content)?;
    Ok(glossary.terms)
}

/// Built-in glossary plus the configured glossary file, if any
pub fn configured_glossary(config: &TerminologyConfig) -> Result<Vec<TerminologyEntry>> {
    let mut entries = builtin_glossary();
    if let Some(path) = &config.glossary_path {
        let extra = load_glossary_file(path)?;
        info!("Loaded {} glossary terms from {}", extra.len(), path.display());
        entries.extend(extra);
    }
    Ok(entries)
}
