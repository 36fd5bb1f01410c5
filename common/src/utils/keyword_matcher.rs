use std::collections::HashMap;

use strsim::levenshtein;

use crate::storage::types::entity::{Entity, EntityType};
use crate::utils::normalize::normalize_name;

/// How a pre-detected entity surfaced from the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Keyword,
    Alias,
}

#[derive(Debug, Clone)]
pub struct MatchedEntity {
    pub entity: Entity,
    pub confidence: f32,
    pub match_kind: MatchKind,
}

/// In-memory index of known entity names and aliases. Process-wide, rebuilt
/// from the entity table on demand; entity writes do not invalidate it.
#[derive(Default)]
pub struct KeywordMatcher {
    entities: Vec<Entity>,
    // normalized canonical name -> indexes into `entities` (one per type)
    by_name: HashMap<String, Vec<usize>>,
    // normalized alias -> index into `entities`
    by_alias: HashMap<String, usize>,
    fuzzy_distance: usize,
}

impl KeywordMatcher {
    pub fn new(fuzzy_distance: usize) -> Self {
        Self {
            fuzzy_distance,
            ..Default::default()
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Replace the cached index with a fresh entity snapshot.
    pub fn load_entities(&mut self, entities: Vec<Entity>) {
        self.by_name.clear();
        self.by_alias.clear();
        self.entities = entities;

        for (idx, entity) in self.entities.iter().enumerate() {
            self.by_name
                .entry(entity.normalized_name.clone())
                .or_default()
                .push(idx);
            for alias in entity.aliases() {
                self.by_alias.entry(alias).or_insert(idx);
            }
        }
    }

    /// Find whole-word canonical and alias matches in free text. Canonical
    /// matches carry 0.9 confidence, alias matches 0.85; a canonical match
    /// wins over an alias match for the same entity.
    pub fn find_in_text(&self, text: &str) -> Vec<MatchedEntity> {
        if text.is_empty() || self.entities.is_empty() {
            return Vec::new();
        }

        let mut matched: HashMap<usize, MatchedEntity> = HashMap::new();

        for word in words_of(text) {
            let normalized_word = normalize_name(word);
            if normalized_word.is_empty() {
                continue;
            }

            for idx in self.lookup_name(&normalized_word) {
                matched
                    .entry(idx)
                    .and_modify(|existing| {
                        if existing.match_kind == MatchKind::Alias {
                            existing.match_kind = MatchKind::Keyword;
                            existing.confidence = 0.9;
                        }
                    })
                    .or_insert_with(|| MatchedEntity {
                        entity: self.entities[idx].clone(),
                        confidence: 0.9,
                        match_kind: MatchKind::Keyword,
                    });
            }

            if let Some(&idx) = self.by_alias.get(&normalized_word) {
                matched.entry(idx).or_insert_with(|| MatchedEntity {
                    entity: self.entities[idx].clone(),
                    confidence: 0.85,
                    match_kind: MatchKind::Alias,
                });
            }
        }

        // Multi-word names never fall out of single-token scanning; check
        // them against the normalized text directly.
        let normalized_text = normalize_name(text);
        for (name, indexes) in &self.by_name {
            if name.len() > 3 && normalized_text.contains(name.as_str()) {
                for &idx in indexes {
                    if self.entities[idx].name.split_whitespace().count() > 1 {
                        matched.entry(idx).or_insert_with(|| MatchedEntity {
                            entity: self.entities[idx].clone(),
                            confidence: 0.9,
                            match_kind: MatchKind::Keyword,
                        });
                    }
                }
            }
        }

        let mut results: Vec<MatchedEntity> = matched.into_values().collect();
        results.sort_by(|a, b| a.entity.id.cmp(&b.entity.id));
        results
    }

    fn lookup_name(&self, normalized_word: &str) -> Vec<usize> {
        if let Some(indexes) = self.by_name.get(normalized_word) {
            return indexes.clone();
        }
        if self.fuzzy_distance == 0 || normalized_word.len() < 4 {
            return Vec::new();
        }
        // Fuzzy fallback for typo-bearing mentions of longer names.
        self.by_name
            .iter()
            .filter(|(name, _)| {
                name.len() >= 4 && levenshtein(name, normalized_word) <= self.fuzzy_distance
            })
            .flat_map(|(_, indexes)| indexes.iter().copied())
            .collect()
    }

    pub fn entities_of_type(&self, entity_type: EntityType) -> Vec<&Entity> {
        self.entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .collect()
    }
}

fn words_of(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '-' || c == '_' || c == '.'))
        .map(|w| w.trim_matches('.'))
        .filter(|w| !w.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::entity::NewEntity;

    fn make_entity(name: &str, entity_type: EntityType, aliases: &[&str]) -> Entity {
        let metadata = if aliases.is_empty() {
            serde_json::json!({})
        } else {
            let normalized: Vec<String> = aliases.iter().map(|a| normalize_name(a)).collect();
            serde_json::json!({ "aliases": normalized })
        };
        Entity::new(
            name.to_owned(),
            entity_type,
            NewEntity {
                metadata,
                ..Default::default()
            },
        )
    }

    fn loaded_matcher(entities: Vec<Entity>) -> KeywordMatcher {
        let mut matcher = KeywordMatcher::new(0);
        matcher.load_entities(entities);
        matcher
    }

    #[test]
    fn finds_entity_by_canonical_name() {
        let entity = make_entity("PyTorch", EntityType::Tool, &[]);
        let matcher = loaded_matcher(vec![entity.clone()]);

        let results = matcher.find_in_text("I love PyTorch for deep learning");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity.id, entity.id);
        assert!((results[0].confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(results[0].match_kind, MatchKind::Keyword);
    }

    #[test]
    fn canonical_match_is_case_insensitive() {
        let matcher = loaded_matcher(vec![make_entity("PyTorch", EntityType::Tool, &[])]);
        assert_eq!(matcher.find_in_text("pytorch is great").len(), 1);
    }

    #[test]
    fn no_partial_word_match() {
        let matcher = loaded_matcher(vec![make_entity("graph", EntityType::Topic, &[])]);
        assert!(matcher.find_in_text("graphql is a query language").is_empty());
    }

    #[test]
    fn finds_entity_by_alias_with_lower_confidence() {
        let entity = make_entity("PyTorch", EntityType::Tool, &["torch"]);
        let matcher = loaded_matcher(vec![entity.clone()]);

        let results = matcher.find_in_text("I use torch for tensors");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity.id, entity.id);
        assert!((results[0].confidence - 0.85).abs() < f32::EPSILON);
        assert_eq!(results[0].match_kind, MatchKind::Alias);
    }

    #[test]
    fn canonical_match_wins_over_alias_for_same_entity() {
        let entity = make_entity("PyTorch", EntityType::Tool, &["torch"]);
        let matcher = loaded_matcher(vec![entity]);

        let results = matcher.find_in_text("PyTorch, also known as torch");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_kind, MatchKind::Keyword);
        assert!((results[0].confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn matches_multi_word_names() {
        let entity = make_entity("Attention Is All You Need", EntityType::Paper, &[]);
        let matcher = loaded_matcher(vec![entity.clone()]);

        let results = matcher.find_in_text("The paper Attention Is All You Need introduced transformers");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].entity.id, entity.id);
    }

    #[test]
    fn reload_clears_previous_index() {
        let mut matcher = KeywordMatcher::new(0);
        matcher.load_entities(vec![make_entity("PyTorch", EntityType::Tool, &[])]);
        assert_eq!(matcher.find_in_text("PyTorch").len(), 1);

        matcher.load_entities(vec![make_entity("TensorFlow", EntityType::Tool, &[])]);
        assert!(matcher.find_in_text("PyTorch").is_empty());
        assert_eq!(matcher.find_in_text("TensorFlow").len(), 1);
    }

    #[test]
    fn fuzzy_distance_catches_typos() {
        let mut matcher = KeywordMatcher::new(1);
        matcher.load_entities(vec![make_entity("kubernetes", EntityType::Topic, &[])]);

        assert_eq!(matcher.find_in_text("deploying on kubernets today").len(), 1);
        // Distance 0 stays strict.
        let strict = loaded_matcher(vec![make_entity("kubernetes", EntityType::Topic, &[])]);
        assert!(strict.find_in_text("deploying on kubernets today").is_empty());
    }

    #[test]
    fn empty_inputs_return_empty() {
        let matcher = loaded_matcher(vec![make_entity("PyTorch", EntityType::Tool, &[])]);
        assert!(matcher.find_in_text("").is_empty());
        assert!(KeywordMatcher::default().find_in_text("PyTorch").is_empty());
    }
}
