//! Robots.txt parser implementation
//!
//! Tokenizing is left to the robotstxt crate, which copes with byte order
//! marks, misspelled keys and mixed line endings. Only `User-agent` and
//! `Disallow` lines are kept; the rules are compiled here.

use robotstxt::{parse_robotstxt, RobotsParseHandler};
use std::collections::{BTreeSet, HashMap};

/// Disallow rules of one robots.txt file, grouped by user agent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RobotsRuleSet {
    /// Lowercase user-agent name to its disallowed path prefixes
    pub disallow_rules: HashMap<String, BTreeSet<String>>,
}

/// Collects groups while the robotstxt tokenizer walks the file
#[derive(Default)]
struct GroupCollector {
    disallow_rules: HashMap<String, BTreeSet<String>>,
    current_agents: Vec<String>,
    group_has_rules: bool,
}

impl GroupCollector {
    /// Any rule line closes the run of `User-agent` lines that opened the group
    fn saw_rule(&mut self) {
        if !self.current_agents.is_empty() {
            self.group_has_rules = true;
        }
    }
}

impl RobotsParseHandler for GroupCollector {
    fn handle_robots_start(&mut self) {}

    fn handle_robots_end(&mut self) {}

    fn handle_user_agent(&mut self, _line_num: u32, user_agent: &str) {
        if self.group_has_rules {
            self.current_agents.clear();
            self.group_has_rules = false;
        }
        let agent = user_agent.trim().to_ascii_lowercase();
        self.disallow_rules.entry(agent.clone()).or_default();
        self.current_agents.push(agent);
    }

    fn handle_allow(&mut self, _line_num: u32, _value: &str) {
        self.saw_rule();
    }

    fn handle_disallow(&mut self, _line_num: u32, value: &str) {
        self.saw_rule();
        let value = value.trim();
        for agent in &self.current_agents {
            self.disallow_rules
                .entry(agent.clone())
                .or_default()
                .insert(value.to_string());
        }
    }

    fn handle_sitemap(&mut self, _line_num: u32, _value: &str) {}

    fn handle_unknown_action(&mut self, _line_num: u32, _action: &str, _value: &str) {
        self.saw_rule();
    }
}

impl RobotsRuleSet {
    /// Parses robots.txt content
    ///
    /// Consecutive `User-agent` lines form one group; the group's `Disallow`
    /// lines apply to all of them. Groups naming the same agent are merged.
    ///
    /// # Example
    ///
    /// ```
    /// use sumi_engine::robots::RobotsRuleSet;
    ///
    /// let rules = RobotsRuleSet::parse("User-agent: *\nDisallow: /private");
    /// assert!(rules.disallow_rules["*"].contains("/private"));
    /// ```
    pub fn parse(content: &str) -> Self {
        let mut collector = GroupCollector::default();
        parse_robotstxt(content, &mut collector);
        Self {
            disallow_rules: collector.disallow_rules,
        }
    }

    /// Compiles the rules that apply to `user_agent`
    ///
    /// A group matches when its name equals the full user agent or its
    /// product token (the part before the first '/' or space), ignoring case.
    /// Without a matching group the `*` group applies; without either,
    /// everything is allowed.
    pub fn compile(&self, user_agent: &str) -> RobotsRules {
        let full = user_agent.trim().to_ascii_lowercase();
        let token = full
            .split(|c: char| c == '/' || c.is_whitespace())
            .next()
            .unwrap_or_default()
            .to_string();

        let rules = self
            .disallow_rules
            .get(&full)
            .or_else(|| self.disallow_rules.get(&token))
            .or_else(|| self.disallow_rules.get("*"));

        match rules {
            Some(rules) => RobotsRules::from_disallow(rules),
            None => RobotsRules::AllowAll,
        }
    }
}

/// Compiled robots.txt decision for one host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RobotsRules {
    AllowAll,
    DenyAll,
    /// Deny paths that start with one of these prefixes at a segment boundary
    Disallow(Vec<String>),
}

impl RobotsRules {
    fn from_disallow(rules: &BTreeSet<String>) -> Self {
        if rules.is_empty() || rules.contains("") {
            return Self::AllowAll;
        }
        if rules.contains("/") {
            return Self::DenyAll;
        }
        Self::Disallow(rules.iter().cloned().collect())
    }

    /// Returns true if the path (query already stripped) may be fetched
    pub fn allows(&self, path: &str) -> bool {
        match self {
            Self::AllowAll => true,
            Self::DenyAll => false,
            Self::Disallow(prefixes) => !prefixes
                .iter()
                .any(|prefix| is_segment_prefix(prefix, path)),
        }
    }
}

/// `/private` covers `/private` and `/private/x` but not `/privateer`
fn is_segment_prefix(prefix: &str, path: &str) -> bool {
    if !path.starts_with(prefix) {
        return false;
    }
    prefix.ends_with('/') || path.len() == prefix.len() || path[prefix.len()..].starts_with('/')
}
