use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub description: String,
    pub rank: u8,
    pub incidence_rate: String,
    pub test_coverage: String,
    pub avg_weighted_exploit: f32,
    pub avg_weighted_impact: f32,
    pub max_occurrences: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttackScenario {
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vulnerable_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploit_example: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snippet {
    pub code: String,
    pub explanation: String,
}

/// Side-by-side vulnerable and fixed code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodeExample {
    pub title: String,
    pub language: String,
    pub vulnerable: Snippet,
    pub secure: Snippet,
}

/// Where this server demonstrates the mitigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImplementationInApp {
    pub has_example: bool,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vulnerability {
    pub id: String,
    pub code: String,
    pub title: String,
    pub short_title: String,
    pub icon: String,
    pub owasp_url: String,
    pub overview: Overview,
    pub description: Vec<String>,
    pub common_vulnerabilities: Vec<String>,
    pub how_to_prevent: Vec<String>,
    pub attack_scenarios: Vec<AttackScenario>,
    pub code_examples: Vec<CodeExample>,
    pub implementation_in_app: ImplementationInApp,
}

/// Summary row for list and search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListItem {
    pub id: String,
    pub code: String,
    pub title: String,
    pub short_title: String,
    pub rank: u8,
    pub incidence_rate: String,
    pub description: String,
    pub icon: String,
}

impl From<&Vulnerability> for ListItem {
    fn from(v: &Vulnerability) -> Self {
        Self {
            id: v.id.clone(),
            code: v.code.clone(),
            title: v.title.clone(),
            short_title: v.short_title.clone(),
            rank: v.overview.rank,
            incidence_rate: v.overview.incidence_rate.clone(),
            description: v.overview.description.clone(),
            icon: v.icon.clone(),
        }
    }
}
