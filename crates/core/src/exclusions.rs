use std::collections::HashSet;

/// Tools the upstream client already reaches through a direct integration.
/// These are left out of the overflow catalog.
pub const DEFAULT_DIRECT_TOOLS: &[&str] = &[
    // File system
    "file-system_read_file",
    "file-system_write_file",
    "file-system_edit_file",
    "file-system_list_directory",
    "file-system_create_directory",
    "file-system_search_files",
    "file-system_move_file",
    "file-system_get_file_info",
    // GitHub
    "github_create_or_update_file",
    "github_search_repositories",
    "github_create_repository",
    "github_get_file_contents",
    "github_push_files",
    "github_create_issue",
    "github_create_pull_request",
    "github_fork_repository",
    // Browser
    "puppeteer_puppeteer_navigate",
    "puppeteer_puppeteer_screenshot",
    "puppeteer_puppeteer_click",
    "puppeteer_puppeteer_fill",
    "puppeteer_puppeteer_evaluate",
];

/// Namespaced tool names to drop from the overflow catalog.
///
/// Matching is exact membership; there is no prefix or wildcard matching.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionSet {
    names: HashSet<String>,
}

impl ExclusionSet {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }

    /// An empty set: every discovered tool is overflow.
    pub fn empty() -> Self {
        Self::default()
    }

    /// The built-in list of directly handled tools.
    pub fn direct_defaults() -> Self {
        Self::new(DEFAULT_DIRECT_TOOLS.iter().copied())
    }

    pub fn contains(&self, namespaced_name: &str) -> bool {
        self.names.contains(namespaced_name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
