use serde::{Deserialize, Serialize};

/// Integration family. Ordering is the display order of health reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceCategory {
    Ai,
    Communication,
    Storage,
    Search,
    Automation,
}

impl ResourceCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Communication => "communication",
            Self::Storage => "storage",
            Self::Search => "search",
            Self::Automation => "automation",
        }
    }
}

impl std::fmt::Display for ResourceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// One supported integration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    pub id: String,
    pub category: ResourceCategory,
    pub display_name: String,
}

impl ResourceDefinition {
    pub fn new(
        id: impl Into<String>,
        category: ResourceCategory,
        display_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            display_name: display_name.into(),
        }
    }
}

const BUILTIN: &[(&str, ResourceCategory, &str)] = &[
    ("anthropic", ResourceCategory::Ai, "Anthropic"),
    ("openai", ResourceCategory::Ai, "OpenAI"),
    ("mistral", ResourceCategory::Ai, "Mistral"),
    ("local-llm", ResourceCategory::Ai, "Local model server"),
    ("email", ResourceCategory::Communication, "Email"),
    ("slack", ResourceCategory::Communication, "Slack"),
    ("webhook", ResourceCategory::Communication, "Outbound webhook"),
    ("postgres", ResourceCategory::Storage, "PostgreSQL"),
    ("s3", ResourceCategory::Storage, "S3-compatible object store"),
    ("redis", ResourceCategory::Storage, "Redis"),
    ("web-search", ResourceCategory::Search, "Web search"),
    ("vector-index", ResourceCategory::Search, "Vector index"),
    ("http-fetch", ResourceCategory::Automation, "HTTP fetch"),
    ("code-sandbox", ResourceCategory::Automation, "Code sandbox"),
];

/// Static list of supported integrations, independent of what is deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<ResourceDefinition>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// Entries are kept sorted by (category, id); duplicate ids keep the
    /// first definition.
    pub fn new(entries: impl IntoIterator<Item = ResourceDefinition>) -> Self {
        let mut sorted: Vec<ResourceDefinition> = Vec::new();
        for entry in entries {
            if !sorted.iter().any(|e| e.id == entry.id) {
                sorted.push(entry);
            }
        }
        sorted.sort_by(|a, b| (a.category, &a.id).cmp(&(b.category, &b.id)));
        Self { entries: sorted }
    }

    pub fn builtin() -> Self {
        Self::new(
            BUILTIN
                .iter()
                .map(|(id, category, name)| ResourceDefinition::new(*id, *category, *name)),
        )
    }

    pub fn get(&self, id: &str) -> Option<&ResourceDefinition> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub fn entries(&self) -> &[ResourceDefinition] {
        &self.entries
    }

    pub fn in_category(&self, category: ResourceCategory) -> impl Iterator<Item = &ResourceDefinition> {
        self.entries.iter().filter(move |e| e.category == category)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
