// src/matcher.rs
//! Keyword matcher: scans campaign text sentence by sentence and yields one
//! [`Occurrence`] per whole-word keyword hit, with its three-sentence context.
//!
//! Order of results: sentence, then metaphor type (config order), then keyword
//! (list order), then left to right inside the sentence.

use anyhow::Result;
use regex::Regex;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::config::MetaphorConfig;
use crate::occurrence::Occurrence;
use crate::text::{Sentence, SentenceSplitter, UnicodeSentenceSplitter};

/* ----------------------------
Compiled keyword lists
---------------------------- */

#[derive(Debug)]
struct CompiledKeyword {
    keyword: String,
    re: Regex,
}

#[derive(Debug)]
struct CompiledList {
    name: String,
    keywords: Vec<CompiledKeyword>,
}

/// Holds one compiled whole-word, case-insensitive regex per keyword.
pub struct KeywordMatcher {
    lists: Vec<CompiledList>,
    splitter: Arc<dyn SentenceSplitter>,
}

impl std::fmt::Debug for KeywordMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordMatcher")
            .field("lists", &self.lists)
            .finish_non_exhaustive()
    }
}

impl KeywordMatcher {
    pub fn new(config: &MetaphorConfig) -> Result<Self> {
        let lists = config
            .lists()
            .iter()
            .map(|list| {
                let keywords = list
                    .keywords
                    .iter()
                    .map(|kw| {
                        let re = keyword_regex(kw).map_err(|e| {
                            anyhow::anyhow!("keyword `{}` ({}) regex error: {}", kw, list.name, e)
                        })?;
                        Ok(CompiledKeyword {
                            keyword: kw.clone(),
                            re,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompiledList {
                    name: list.name.clone(),
                    keywords,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            lists,
            splitter: Arc::new(UnicodeSentenceSplitter),
        })
    }

    pub fn with_splitter(mut self, splitter: Arc<dyn SentenceSplitter>) -> Self {
        self.splitter = splitter;
        self
    }

    /// Lazily scan `text` for every configured keyword. `None` text yields
    /// nothing. Each call starts a fresh scan.
    pub fn scan<'a>(&'a self, campaign_id: &'a str, text: Option<&'a str>) -> Occurrences<'a> {
        let text = text.unwrap_or("");
        let sentences = self.splitter.split(text);

        // Char offset of each sentence start inside the document.
        let mut char_starts = Vec::with_capacity(sentences.len());
        let (mut byte_pos, mut char_pos) = (0usize, 0usize);
        for s in &sentences {
            char_pos += text[byte_pos..s.byte_start].chars().count();
            byte_pos = s.byte_start;
            char_starts.push(char_pos);
        }

        Occurrences {
            matcher: self,
            campaign_id,
            sentences,
            char_starts,
            sentence_ix: 0,
            list_ix: 0,
            keyword_ix: 0,
            pending: VecDeque::new(),
        }
    }
}

/// Whole-word, case-insensitive pattern for a literal keyword.
fn keyword_regex(keyword: &str) -> std::result::Result<Regex, regex::Error> {
    Regex::new(&format!(r"(?i)\b{}\b", regex::escape(keyword)))
}

/// Iterator returned by [`KeywordMatcher::scan`].
pub struct Occurrences<'a> {
    matcher: &'a KeywordMatcher,
    campaign_id: &'a str,
    sentences: Vec<Sentence<'a>>,
    char_starts: Vec<usize>,
    sentence_ix: usize,
    list_ix: usize,
    keyword_ix: usize,
    pending: VecDeque<Occurrence>,
}

impl Occurrences<'_> {
    /// Scan the (sentence, list, keyword) under the cursor, then advance it.
    fn step(&mut self) {
        let matcher = self.matcher;
        let lists = &matcher.lists;
        let Some(list) = lists.get(self.list_ix) else {
            self.list_ix = 0;
            self.keyword_ix = 0;
            self.sentence_ix += 1;
            return;
        };
        let Some(kw) = list.keywords.get(self.keyword_ix) else {
            self.keyword_ix = 0;
            self.list_ix += 1;
            return;
        };

        let ix = self.sentence_ix;
        let sentence = self.sentences[ix].text;
        for m in kw.re.find_iter(sentence) {
            let start = sentence[..m.start()].chars().count();
            let end = start + m.as_str().chars().count();
            self.pending.push_back(Occurrence {
                campaign_id: self.campaign_id.to_string(),
                keyword: kw.keyword.clone(),
                metaphor_type: list.name.clone(),
                start_offset: start,
                end_offset: end,
                char_location: Some(self.char_starts[ix] + start),
                before: ix
                    .checked_sub(1)
                    .map(|p| self.sentences[p].text.to_string())
                    .unwrap_or_default(),
                current: sentence.to_string(),
                next: self
                    .sentences
                    .get(ix + 1)
                    .map(|s| s.text.to_string())
                    .unwrap_or_default(),
                metaphorical: None,
            });
        }
        self.keyword_ix += 1;
    }
}

impl Iterator for Occurrences<'_> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        loop {
            if let Some(o) = self.pending.pop_front() {
                return Some(o);
            }
            if self.sentence_ix >= self.sentences.len() {
                return None;
            }
            self.step();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::KeywordList;

    fn matcher(battle: &[&str], journey: &[&str]) -> KeywordMatcher {
        let cfg = MetaphorConfig::new(vec![
            KeywordList::new("battle", battle.iter().copied()),
            KeywordList::new("journey", journey.iter().copied()),
        ])
        .unwrap();
        KeywordMatcher::new(&cfg).unwrap()
    }

    fn keywords(m: &KeywordMatcher, text: &str) -> Vec<String> {
        m.scan("c", Some(text)).map(|o| o.keyword).collect()
    }

    #[test]
    fn whole_words_only() {
        let m = matcher(&["war", "win"], &[]);
        assert!(keywords(&m, "The warmth of the award ceremony.").is_empty());
        assert!(keywords(&m, "Open the window.").is_empty());
        assert_eq!(keywords(&m, "We will win. Win, then rest."), vec!["win", "win"]);
        assert_eq!(keywords(&m, "WAR is over"), vec!["war"]);
    }

    #[test]
    fn context_window_at_document_edges() {
        let m = matcher(&["fight"], &["journey"]);
        let text = "We fight today. Nothing here. The journey ends.";
        let found: Vec<_> = m.scan("c", Some(text)).collect();
        assert_eq!(found.len(), 2);

        let first = &found[0];
        assert_eq!(first.before, "");
        assert_eq!(first.current, "We fight today.");
        assert_eq!(first.next, "Nothing here.");

        let last = &found[1];
        assert_eq!(last.before, "Nothing here.");
        assert_eq!(last.current, "The journey ends.");
        assert_eq!(last.next, "");
        assert_eq!(last.metaphor_type, "journey");
    }

    #[test]
    fn offsets_are_sentence_and_document_relative() {
        let m = matcher(&["battle"], &[]);
        let text = "Café life. Her battle began.";
        let o = m.scan("c", Some(text)).next().unwrap();
        assert_eq!((o.start_offset, o.end_offset), (4, 10));
        assert_eq!(&o.current[4..10], "battle");
        let doc_chars: Vec<char> = text.chars().collect();
        let loc = o.char_location.unwrap();
        let at: String = doc_chars[loc..loc + 6].iter().collect();
        assert!(o.is_located_in(text));
        assert_eq!(at, "battle");
    }

    #[test]
    fn ordering_sentence_then_type_then_keyword_then_position() {
        let m = matcher(&["fight", "war"], &["path"]);
        let text = "A path, a war, a fight, a war. Then war.";
        let got: Vec<_> = m
            .scan("c", Some(text))
            .map(|o| (o.keyword, o.start_offset))
            .collect();
        assert_eq!(
            got,
            vec![
                ("fight".to_string(), 17),
                ("war".to_string(), 10),
                ("war".to_string(), 26),
                ("path".to_string(), 2),
                ("war".to_string(), 5),
            ]
        );
    }

    #[test]
    fn missing_text_yields_nothing_and_scan_restarts() {
        let m = matcher(&["fight"], &[]);
        assert_eq!(m.scan("c", None).count(), 0);
        assert_eq!(m.scan("c", Some("")).count(), 0);
        let text = Some("fight fight");
        assert_eq!(m.scan("c", text).count(), 2);
        assert_eq!(m.scan("c", text).count(), 2);
    }
}
