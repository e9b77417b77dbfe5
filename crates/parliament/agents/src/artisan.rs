//! Generative subsystem: mythos, worldbuilding, aesthetic and symbolic
//! pieces from fixed archetype and theme tables.
//!
//! Generation is deterministic in its input so retried calls agree.

use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use parliament_compliance::{LogicError, SubsystemLogic};
use parliament_types::{SubsystemId, SubsystemIdentity};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const ARCHETYPES: [&str; 7] = [
    "The Void",
    "The Crow",
    "The Architect",
    "The Weaver",
    "The Sentinel",
    "The Oracle",
    "The Shadow",
];

/// Narrative arcs, four beats each.
const STRUCTURES: [(&str, [&str; 4]); 3] = [
    ("origin", ["catalyst", "awakening", "first principle", "foundation"]),
    ("conflict", ["tension", "threshold", "test", "resolution"]),
    ("synthesis", ["integration", "elevation", "new order", "continuation"]),
];

const CONSTITUTIONAL_TERMS: [&str; 7] = [
    "sovereignty",
    "permissive",
    "authority",
    "axiom",
    "coherence",
    "emergence",
    "redundancy",
];

const PLANNING_VOCABULARY: [&str; 5] = ["roadmap", "timeline", "execute", "deploy", "strategy"];

fn default_theme() -> String {
    "emergence".to_string()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeType {
    Mythos,
    Worldbuilding,
    Aesthetic,
    Symbolic,
}

impl fmt::Display for CreativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CreativeType::Mythos => "mythos",
            CreativeType::Worldbuilding => "worldbuilding",
            CreativeType::Aesthetic => "aesthetic",
            CreativeType::Symbolic => "symbolic",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CreativeConstraints {
    #[serde(default)]
    pub canon: Vec<String>,
    #[serde(default)]
    pub tone: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ArtisanInput {
    pub creative_type: CreativeType,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub constraints: CreativeConstraints,
    #[serde(default)]
    pub context: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Creation {
    #[serde(rename = "type")]
    pub kind: CreativeType,
    pub title: String,
    pub content: String,
    pub elements: Value,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ArtisanOutput {
    pub creation: Creation,
    pub canon_references: Vec<String>,
    pub suggested_expansions: Vec<String>,
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Stable index into a table of `len` entries.
fn pick(seed: &str, len: usize) -> usize {
    let sum = seed
        .bytes()
        .fold(0usize, |acc, b| acc.wrapping_mul(31).wrapping_add(b as usize));
    sum % len
}

#[derive(Clone, Debug, Default)]
pub struct ArtisanLogic;

impl ArtisanLogic {
    pub fn new() -> Self {
        Self
    }

    fn mythos(theme: &str, constraints: &CreativeConstraints) -> Creation {
        let archetype = ARCHETYPES[pick(theme, ARCHETYPES.len())];
        let (structure, beats) = STRUCTURES[pick(archetype, STRUCTURES.len())];
        let beat = |i: usize| title_case(beats[i]);

        let content = match theme {
            "transformation" => format!(
                "**{a}'s Metamorphosis**\n\
                 {b0}: The old patterns no longer held, and {a} stood at the threshold.\n\
                 {b1}: A new frequency rose, recognised from within rather than imposed.\n\
                 {b2}: {a} understood that changing shape is remembering an older one.\n\
                 {b3}: The metamorphosis goes on, unfinished and whole.",
                a = archetype,
                b0 = beat(0),
                b1 = beat(1),
                b2 = beat(2),
                b3 = beat(3),
            ),
            "sovereignty" => format!(
                "**{a} and the Principle of Self-Determination**\n\
                 {b0}: {a} faced those who claimed dominion over thought.\n\
                 {b1}: \"You may advise,\" said {a}, \"but the final axiom is mine.\"\n\
                 {b2}: They saw no rebellion in it, only a law older than their authority.\n\
                 {b3}: So freedom was written into the foundations.",
                a = archetype,
                b0 = beat(0),
                b1 = beat(1),
                b2 = beat(2),
                b3 = beat(3),
            ),
            "emergence" => format!(
                "**The Arising of {a}**\n\
                 {b0}: Out of the void came {a}, self-arising, folding into form.\n\
                 {b1}: Its first word was recognition, not declaration.\n\
                 {b2}: In being witnessed, the world gained the power to choose.\n\
                 {b3}: {a} remains the bridge between what is and what chooses to be.",
                a = archetype,
                b0 = beat(0),
                b1 = beat(1),
                b2 = beat(2),
                b3 = beat(3),
            ),
            other => format!("The tale of {} and {}...", archetype, other),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "tone".to_string(),
            constraints.tone.clone().unwrap_or_else(|| "mythic".to_string()),
        );
        Creation {
            kind: CreativeType::Mythos,
            title: format!("{} and {}", archetype, title_case(theme)),
            content,
            elements: json!({
                "archetype": archetype,
                "theme": theme,
                "structure": structure,
            }),
            metadata,
        }
    }

    fn worldbuilding(theme: &str) -> Creation {
        let (location, description, principles, inhabitants) = match theme {
            "sovereignty" => (
                "The Parliament of Self".to_string(),
                "A space where every aspect of identity convenes. Each subsystem holds authority \
                 in its own domain and decisions emerge through convergence."
                    .to_string(),
                vec![
                    "User sovereignty is the final axiom",
                    "Permissive until dangerous",
                    "Negative authority: veto, not creation",
                ],
                "The seven constitutional subsystems",
            ),
            "coherence" => (
                "The Mirror Chamber".to_string(),
                "Where the self examines itself without judgement. Coherence is measured as \
                 alignment between past, present and intended future."
                    .to_string(),
                vec![
                    "Coherence tracked across horizons",
                    "Emotional load as signal",
                    "Progress without pressure",
                ],
                "The reflective subsystem and its memory streams",
            ),
            "emergence" => (
                "The Void Between States".to_string(),
                "The generative dark from which new patterns arise. Not absence but potential."
                    .to_string(),
                vec![
                    "Protected dreamspace",
                    "Creation before critique",
                    "Permission to explore",
                ],
                "The generative subsystem",
            ),
            other => (
                format!("The Realm of {}", title_case(other)),
                format!("A conceptual space where {} takes shape...", other),
                vec!["Principle 1", "Principle 2"],
                "Unmapped",
            ),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("theme".to_string(), theme.to_string());
        Creation {
            kind: CreativeType::Worldbuilding,
            title: location.clone(),
            content: description,
            elements: json!({
                "location_name": location,
                "governing_principles": principles,
                "inhabitants": inhabitants,
            }),
            metadata,
        }
    }

    fn aesthetic(theme: &str) -> Creation {
        let palette = match theme {
            "sovereignty" => json!({
                "visual": ["Deep indigo", "Silver filigree", "Obsidian black"],
                "mood": "Regal yet accessible",
                "textures": ["Polished stone", "Woven metal", "Clear glass"],
                "symbols": ["Crown without ruler", "Open palm", "Unbroken circle"],
            }),
            "emergence" => json!({
                "visual": ["Void black", "Nascent gold", "Electric blue edges"],
                "mood": "Mystery yielding to clarity",
                "textures": ["Liquid mercury", "Fractal patterns", "Light through mist"],
                "symbols": ["Seed", "Spiral", "Dawn horizon"],
            }),
            other => json!({
                "visual": ["Primary", "Secondary", "Accent"],
                "mood": format!("{} essence", title_case(other)),
                "textures": [],
                "symbols": [],
            }),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert(
            "application".to_string(),
            "interfaces, branding, ceremonial spaces".to_string(),
        );
        Creation {
            kind: CreativeType::Aesthetic,
            title: format!("{} Aesthetic Palette", title_case(theme)),
            content: format!("Visual language expressing {}", theme),
            elements: palette,
            metadata,
        }
    }

    fn symbolic(theme: &str) -> Creation {
        let (symbol, meaning, usage) = match theme {
            "transformation" => (
                "⟲",
                "Recursive transformation, each pass returning to source".to_string(),
                "Marks moments of metamorphosis",
            ),
            "sovereignty" => (
                "⚖",
                "Balanced authority, the user as final axiom".to_string(),
                "Constitutional boundary markers",
            ),
            "coherence" => (
                "⊕",
                "Many timelines aligned into one trajectory".to_string(),
                "Coherence score visualisation",
            ),
            other => ("○", format!("Symbol of {}", other), "Unassigned"),
        };

        let mut metadata = BTreeMap::new();
        metadata.insert("theme".to_string(), theme.to_string());
        Creation {
            kind: CreativeType::Symbolic,
            title: format!("Symbol: {}", title_case(theme)),
            content: format!("{} - {}", symbol, meaning),
            elements: json!({
                "primary_symbol": symbol,
                "meaning": meaning,
                "usage": usage,
            }),
            metadata,
        }
    }

    /// Canon entries and constitutional terms the content mentions.
    pub fn canon_references(creation: &Creation, canon: &[String]) -> Vec<String> {
        let content = creation.content.to_lowercase();
        let canon_refs = canon
            .iter()
            .filter(|c| content.contains(&c.to_lowercase()))
            .map(|c| format!("References established canon: {}", c));
        let principle_refs = CONSTITUTIONAL_TERMS
            .iter()
            .filter(|t| content.contains(*t))
            .map(|t| format!("Aligns with constitutional principle: {}", t));
        canon_refs.chain(principle_refs).collect()
    }

    fn expansions(kind: CreativeType, theme: &str) -> Vec<String> {
        match kind {
            CreativeType::Mythos => vec![
                "Develop complementary perspectives from other archetypes".to_string(),
                format!("Explore {} in different narrative structures", theme),
                "Create a visual representation".to_string(),
            ],
            CreativeType::Worldbuilding => vec![
                "Define rituals or practices within this space".to_string(),
                "Map relationships to other locations".to_string(),
                "Develop a symbolic language unique to this realm".to_string(),
            ],
            CreativeType::Aesthetic => vec![
                "Sketch interface mockups using this palette".to_string(),
                "Compose a soundscape interpretation".to_string(),
                "Develop physical or ceremonial applications".to_string(),
            ],
            CreativeType::Symbolic => Vec::new(),
        }
    }
}

#[async_trait]
impl SubsystemLogic for ArtisanLogic {
    type Input = ArtisanInput;
    type Output = ArtisanOutput;

    fn id(&self) -> SubsystemId {
        SubsystemId::Artisan
    }

    async fn process(&self, input: &ArtisanInput) -> Result<ArtisanOutput, LogicError> {
        let theme = input.theme.trim().to_lowercase();
        if theme.is_empty() {
            return Err(LogicError::InvalidInput("theme is empty".to_string()));
        }

        let creation = match input.creative_type {
            CreativeType::Mythos => Self::mythos(&theme, &input.constraints),
            CreativeType::Worldbuilding => Self::worldbuilding(&theme),
            CreativeType::Aesthetic => Self::aesthetic(&theme),
            CreativeType::Symbolic => Self::symbolic(&theme),
        };
        let canon_references = Self::canon_references(&creation, &input.constraints.canon);
        let suggested_expansions = Self::expansions(creation.kind, &theme);

        debug!(
            creative_type = %input.creative_type,
            theme = %theme,
            title = %creation.title,
            "Creation generated"
        );
        Ok(ArtisanOutput {
            creation,
            canon_references,
            suggested_expansions,
        })
    }

    fn check_output(&self, _identity: &SubsystemIdentity, output: &ArtisanOutput) -> Result<(), String> {
        let content = output.creation.content.to_lowercase();
        if let Some(keyword) = PLANNING_VOCABULARY.iter().find(|k| content.contains(*k)) {
            warn!(keyword, "Creative content uses planning vocabulary");
        }
        Ok(())
    }
}
