//! Slates published on the petition site.
//!
//! A stage with a slate source takes its candidates from the slate's items,
//! in order.

use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SlateItem {
    pub candidate_name: String,
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Slate {
    pub slate_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Unlisted slates are still reachable by id.
    #[serde(default)]
    pub dont_list: bool,
    #[serde(default)]
    pub election_year: Option<u32>,
    #[serde(default)]
    pub items: Vec<SlateItem>,
}

impl Slate {
    pub fn candidates(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| item.candidate_name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect()
    }
}

/// The answer of the slate listing endpoint.
#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlateList {
    #[serde(rename = "Results", default)]
    pub results: Vec<Slate>,
}

impl SlateList {
    /// The slates meant to be offered, in the server's order.
    pub fn listed(&self) -> impl Iterator<Item = &Slate> {
        self.results.iter().filter(|s| !s.dont_list)
    }
}
