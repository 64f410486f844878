use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::{fmt, fs, path::Path};
use tracing::info;

use crate::{common::SignToken, error::CatalogError};

/// Which effect family a jutsu (or combo part) drives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EffectKind {
    Fire,
    Lightning,
    Rasengan,
    Clone,
    Eye,
    Custom(String),
}

impl EffectKind {
    /// Registry key of the effect instance that renders this kind.
    pub fn name(&self) -> &str {
        match self {
            EffectKind::Fire => "fire",
            EffectKind::Lightning => "lightning",
            EffectKind::Rasengan => "rasengan",
            EffectKind::Clone => "clone",
            EffectKind::Eye => "eye",
            EffectKind::Custom(name) => name,
        }
    }
}

impl From<String> for EffectKind {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "fire" => EffectKind::Fire,
            "lightning" => EffectKind::Lightning,
            "rasengan" => EffectKind::Rasengan,
            "clone" => EffectKind::Clone,
            "eye" => EffectKind::Eye,
            other => EffectKind::Custom(other.to_string()),
        }
    }
}

impl From<EffectKind> for String {
    fn from(value: EffectKind) -> Self {
        value.name().to_string()
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComboPart {
    pub name: String,
    /// 1-based step count at which the part fires.
    pub at_step: usize,
    pub effect_kind: EffectKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JutsuDefinition {
    pub sequence: Vec<SignToken>,
    #[serde(default)]
    pub display_text: String,
    pub effect_kind: EffectKind,
    #[serde(default = "default_duration")]
    pub duration: f64,
    #[serde(default)]
    pub min_level: u32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub combo_parts: Vec<ComboPart>,
}

fn default_duration() -> f64 {
    5.0
}

impl JutsuDefinition {
    pub fn new(sequence: &[&str], display_text: &str, effect_kind: EffectKind) -> Self {
        Self {
            sequence: sequence.iter().map(|s| SignToken::new(s)).collect(),
            display_text: display_text.to_string(),
            effect_kind,
            duration: default_duration(),
            min_level: 0,
            combo_parts: Vec::new(),
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_min_level(mut self, min_level: u32) -> Self {
        self.min_level = min_level;
        self
    }

    pub fn with_combo_part(mut self, name: &str, at_step: usize, effect_kind: EffectKind) -> Self {
        self.combo_parts.push(ComboPart {
            name: name.to_string(),
            at_step,
            effect_kind,
        });
        self
    }

    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }

    fn validate(&self, name: &str) -> Result<(), CatalogError> {
        if self.sequence.is_empty() {
            return Err(CatalogError::EmptySequence(name.to_string()));
        }
        if !self.duration.is_finite() || self.duration < 0.0 {
            return Err(CatalogError::InvalidDuration {
                name: name.to_string(),
                duration: self.duration,
            });
        }
        let mut previous = 0;
        for part in &self.combo_parts {
            if part.at_step == 0 || part.at_step > self.sequence.len() {
                return Err(CatalogError::ComboStepOutOfRange {
                    name: name.to_string(),
                    part: part.name.clone(),
                    at_step: part.at_step,
                    len: self.sequence.len(),
                });
            }
            if part.at_step <= previous {
                return Err(CatalogError::ComboStepOrder {
                    name: name.to_string(),
                    part: part.name.clone(),
                });
            }
            previous = part.at_step;
        }
        Ok(())
    }
}

/// Read-only set of jutsu definitions, in registration order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JutsuCatalog {
    jutsus: IndexMap<String, JutsuDefinition>,
}

impl JutsuCatalog {
    pub fn official() -> Self {
        let mut jutsus = IndexMap::new();
        jutsus.insert(
            "Fireball".to_string(),
            JutsuDefinition::new(
                &["horse", "snake", "ram", "monkey", "boar", "horse", "tiger"],
                "KATON: GOUKAKYUU NO JUTSU!!",
                EffectKind::Fire,
            ),
        );
        jutsus.insert(
            "Chidori".to_string(),
            JutsuDefinition::new(&["ox", "hare", "monkey"], "CHIDORI: KAZUSA NO JUTSU!", EffectKind::Lightning),
        );
        jutsus.insert(
            "Water Dragon".to_string(),
            JutsuDefinition::new(
                &["ox", "monkey", "hare", "rat", "boar", "bird", "ox", "horse", "bird"],
                "Water Dragon Bullet!",
                EffectKind::Custom("water".to_string()),
            )
            .with_min_level(2),
        );
        jutsus.insert(
            "Shadow Clone".to_string(),
            JutsuDefinition::new(
                &["ram", "snake", "tiger"],
                "Kage Bunshin no Jutsu!",
                EffectKind::Clone,
            ),
        );
        jutsus.insert(
            "Phoenix Flower".to_string(),
            JutsuDefinition::new(
                &["rat", "tiger", "dog", "ox", "hare", "tiger"],
                "Phoenix Sage Fire!",
                EffectKind::Fire,
            )
            .with_min_level(1),
        );
        jutsus.insert(
            "Sharingan".to_string(),
            JutsuDefinition::new(
                &["snake", "ram", "monkey", "boar", "horse", "tiger"],
                "SHARINGAN!",
                EffectKind::Eye,
            )
            .with_duration(8.0)
            .with_min_level(3),
        );
        jutsus.insert(
            "Rasengan".to_string(),
            JutsuDefinition::new(&["ram"], "RASENGAN!", EffectKind::Rasengan),
        );
        jutsus.insert(
            "Clone Chidori".to_string(),
            JutsuDefinition::new(
                &["ram", "snake", "tiger", "ox", "hare", "monkey"],
                "SHADOW CLONE: CHIDORI",
                EffectKind::Lightning,
            )
            .with_combo_part("clone", 3, EffectKind::Clone)
            .with_min_level(2),
        );
        Self { jutsus }
    }

    pub fn from_json(json: &str) -> Result<Self, CatalogError> {
        let catalog: Self = serde_json::from_str(json)?;
        catalog.validate()?;
        Ok(catalog)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path)?;
        let catalog = Self::from_json(&raw)?;
        info!(
            "Loaded {} jutsus from {}",
            catalog.len(),
            path.display()
        );
        Ok(catalog)
    }

    pub fn validate(&self) -> Result<(), CatalogError> {
        if self.jutsus.is_empty() {
            return Err(CatalogError::Empty);
        }
        for (name, definition) in &self.jutsus {
            definition.validate(name)?;
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&JutsuDefinition> {
        self.jutsus.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&JutsuDefinition, CatalogError> {
        self.get(name)
            .ok_or_else(|| CatalogError::UnknownJutsu(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.jutsus.keys().map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.jutsus.get_index_of(name)
    }

    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.jutsus.get_index(index).map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &JutsuDefinition)> {
        self.jutsus.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.jutsus.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jutsus.is_empty()
    }

    /// Every distinct sign used by any jutsu, in first-seen order.
    pub fn sign_vocabulary(&self) -> Vec<SignToken> {
        let mut signs: Vec<SignToken> = Vec::new();
        for definition in self.jutsus.values() {
            for sign in &definition.sequence {
                if !signs.contains(sign) {
                    signs.push(sign.clone());
                }
            }
        }
        signs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn official_catalog_is_valid() {
        let catalog = JutsuCatalog::official();
        catalog.validate().expect("built-in registry should validate");
        assert_eq!(catalog.name_at(0), Some("Fireball"));
        assert_eq!(
            catalog.get("Shadow Clone").map(|d| d.len()),
            Some(3)
        );
        assert_eq!(catalog.get("Rasengan").map(|d| d.duration), Some(5.0));
        assert_eq!(
            catalog.get("Shadow Clone").map(|d| d.display_text.as_str()),
            Some("Kage Bunshin no Jutsu!")
        );
    }

    #[test]
    fn json_round_trips_schema_fields() {
        let json = r#"{
            "Clone Strike": {
                "sequence": ["Ram", "snake", "tiger", "ox"],
                "displayText": "CLONE STRIKE",
                "effectKind": "lightning",
                "minLevel": 1,
                "comboParts": [{"name": "clone", "atStep": 3, "effectKind": "clone"}]
            }
        }"#;
        let catalog = JutsuCatalog::from_json(json).expect("catalog should parse");
        let def = catalog.get("Clone Strike").expect("jutsu present");
        assert_eq!(def.sequence[0], SignToken::new("ram"));
        assert_eq!(def.duration, 5.0);
        assert_eq!(def.effect_kind, EffectKind::Lightning);
        assert_eq!(def.combo_parts[0].effect_kind, EffectKind::Clone);
    }

    #[test]
    fn rejects_empty_sequence() {
        let json = r#"{"Nothing": {"sequence": [], "effectKind": "fire"}}"#;
        assert!(matches!(
            JutsuCatalog::from_json(json),
            Err(CatalogError::EmptySequence(_))
        ));
    }

    #[test]
    fn rejects_bad_combo_steps() {
        let out_of_range = r#"{"J": {"sequence": ["ram"], "effectKind": "fire",
            "comboParts": [{"name": "c", "atStep": 2, "effectKind": "clone"}]}}"#;
        assert!(matches!(
            JutsuCatalog::from_json(out_of_range),
            Err(CatalogError::ComboStepOutOfRange { .. })
        ));

        let unordered = r#"{"J": {"sequence": ["ram", "ox", "rat"], "effectKind": "fire",
            "comboParts": [
                {"name": "a", "atStep": 2, "effectKind": "clone"},
                {"name": "b", "atStep": 2, "effectKind": "eye"}
            ]}}"#;
        assert!(matches!(
            JutsuCatalog::from_json(unordered),
            Err(CatalogError::ComboStepOrder { .. })
        ));
    }

    #[test]
    fn rejects_negative_or_nan_duration() {
        let negative = r#"{"J": {"sequence": ["ram"], "effectKind": "fire", "duration": -1.0}}"#;
        assert!(matches!(
            JutsuCatalog::from_json(negative),
            Err(CatalogError::InvalidDuration { .. })
        ));

        let mut jutsus = IndexMap::new();
        jutsus.insert(
            "J".to_string(),
            JutsuDefinition::new(&["ram"], "", EffectKind::Fire).with_duration(f64::NAN),
        );
        assert!(matches!(
            JutsuCatalog { jutsus }.validate(),
            Err(CatalogError::InvalidDuration { .. })
        ));
    }

    #[test]
    fn unknown_effect_kind_becomes_custom() {
        assert_eq!(
            EffectKind::from("Water".to_string()),
            EffectKind::Custom("water".to_string())
        );
    }
}
