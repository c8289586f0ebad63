use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::constants::extraction::{LOGIN_COOKIE_PATTERN, WELCOME_PATH_PATTERN};
use crate::data::RequestRecord;
use crate::errors::AnalyticsError;
use crate::index::UserIndex;
use crate::types::UserId;

/// Request field an extraction rule inspects.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleField {
    /// The request path.
    Path,
    /// The raw `Cookie` header.
    Cookie,
}

impl RuleField {
    fn select(self, record: &RequestRecord) -> &str {
        match self {
            RuleField::Path => &record.request_path,
            RuleField::Cookie => &record.cookie_header,
        }
    }
}

impl fmt::Display for RuleField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RuleField::Path => "path",
            RuleField::Cookie => "cookie",
        })
    }
}

/// A pattern applied to one request field; capture group 1 is the user name.
#[derive(Clone, Debug)]
pub struct ExtractionRule {
    /// Field the pattern is matched against.
    pub field: RuleField,
    pattern: Regex,
}

impl ExtractionRule {
    /// Compile `pattern`; it must contain at least one capture group.
    pub fn new(field: RuleField, pattern: &str) -> Result<Self, AnalyticsError> {
        let pattern = Regex::new(pattern).map_err(|err| {
            AnalyticsError::Configuration(format!("invalid {field} extraction pattern: {err}"))
        })?;
        if pattern.captures_len() < 2 {
            return Err(AnalyticsError::Configuration(format!(
                "{field} extraction pattern '{}' has no capture group",
                pattern.as_str()
            )));
        }
        Ok(Self { field, pattern })
    }

    /// Source text of the compiled pattern.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    fn apply(&self, record: &RequestRecord) -> Option<String> {
        let captures = self.pattern.captures(self.field.select(record))?;
        let name = captures.get(1)?.as_str();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// User name recovered from a request, tagged with the rule kind that matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    /// Extracted user name.
    pub name: String,
    /// Field of the rule that produced it.
    pub field: RuleField,
}

/// Outcome of looking a candidate up in the user index.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Resolution {
    /// The name or email belongs to this user.
    Match(UserId),
    /// No user is indexed under the name.
    Miss,
}

impl Resolution {
    /// Matched user id, if any.
    pub fn user_id(self) -> Option<UserId> {
        match self {
            Resolution::Match(id) => Some(id),
            Resolution::Miss => None,
        }
    }
}

/// Ordered rule list; the first rule that matches a request wins.
#[derive(Clone, Debug)]
pub struct IdentityExtractor {
    rules: Vec<ExtractionRule>,
}

impl IdentityExtractor {
    /// Welcome-path rule first, then the login cookie rule.
    pub fn new() -> Result<Self, AnalyticsError> {
        Ok(Self::with_rules(vec![
            ExtractionRule::new(RuleField::Path, WELCOME_PATH_PATTERN)?,
            ExtractionRule::new(RuleField::Cookie, LOGIN_COOKIE_PATTERN)?,
        ]))
    }

    /// Extractor over a custom rule list, tried in order.
    pub fn with_rules(rules: Vec<ExtractionRule>) -> Self {
        Self { rules }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[ExtractionRule] {
        &self.rules
    }

    /// Candidate user name for `record`, if any rule matches.
    pub fn extract(&self, record: &RequestRecord) -> Option<Candidate> {
        self.rules.iter().find_map(|rule| {
            rule.apply(record).map(|name| Candidate {
                name,
                field: rule.field,
            })
        })
    }

    /// Look `candidate` up; a miss is logged and never fails the run.
    pub fn resolve(&self, candidate: &Candidate, index: &UserIndex) -> Resolution {
        match index.get(&candidate.name) {
            Some(id) => Resolution::Match(id),
            None => {
                warn!(
                    name = %candidate.name,
                    rule = %candidate.field,
                    "no user for extracted name"
                );
                Resolution::Miss
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::UserIdentity;

    const TOKEN: &str = "0123456789abcdef0123456789abcdef01234567";

    fn request(path: &str, cookie: &str) -> RequestRecord {
        RequestRecord {
            id: 1,
            access_time: 0,
            source_address: "10.0.0.1".into(),
            request_path: path.into(),
            cookie_header: cookie.into(),
            user_agent: "Mozilla/5.0".into(),
            referer: "(none)".into(),
        }
    }

    fn extractor() -> IdentityExtractor {
        IdentityExtractor::new().unwrap()
    }

    #[test]
    fn welcome_path_wins_over_cookie() {
        let cookie = format!("adhocracy_login={TOKEN}alice!rest");
        let candidate = extractor()
            .extract(&request("/welcome/jdoe", &cookie))
            .unwrap();
        assert_eq!(candidate.name, "jdoe");
        assert_eq!(candidate.field, RuleField::Path);
    }

    #[test]
    fn welcome_path_accepts_segment_prefix_and_suffixes() {
        let extractor = extractor();
        for path in [
            "/welcome/jdoe",
            "/de/welcome/jdoe",
            "/welcome/jdoe/",
            "/welcome/jdoe?came_from=/instance",
            "/i/welcome/jdoe#top",
        ] {
            let candidate = extractor.extract(&request(path, "(none)"));
            assert_eq!(candidate.map(|c| c.name).as_deref(), Some("jdoe"), "{path}");
        }
        for path in ["/a/b/welcome/jdoe", "/welcome/", "/welcomed/jdoe", "(none)"] {
            assert!(extractor.extract(&request(path, "(none)")).is_none(), "{path}");
        }
    }

    #[test]
    fn login_cookie_yields_name_up_to_bang() {
        let extractor = extractor();
        let plain = format!("lang=de; adhocracy_login={TOKEN}alice!rest");
        let quoted = format!("adhocracy_login=\"{TOKEN}alice!userid_type:int\"");
        for cookie in [plain, quoted] {
            let candidate = extractor.extract(&request("/instance", &cookie)).unwrap();
            assert_eq!(candidate.name, "alice");
            assert_eq!(candidate.field, RuleField::Cookie);
        }
    }

    #[test]
    fn malformed_cookie_tokens_do_not_match() {
        let extractor = extractor();
        let short = format!("adhocracy_login={}zed!", &TOKEN[..39]);
        let unterminated = format!("adhocracy_login={TOKEN}alice");
        for cookie in [short, unterminated, "(none)".to_string()] {
            assert!(extractor.extract(&request("/", &cookie)).is_none(), "{cookie}");
        }
    }

    #[test]
    fn resolve_reports_matches_and_misses() {
        let index = UserIndex::from_identities(&[UserIdentity {
            id: 42,
            display_name: "jdoe".into(),
            email: "jdoe@example.org".into(),
        }]);
        let extractor = extractor();
        let hit = extractor.extract(&request("/welcome/jdoe", "(none)")).unwrap();
        assert_eq!(extractor.resolve(&hit, &index), Resolution::Match(42));
        let miss = extractor.extract(&request("/welcome/ghost", "(none)")).unwrap();
        assert_eq!(extractor.resolve(&miss, &index), Resolution::Miss);
    }

    #[test]
    fn custom_rules_need_a_capture_group() {
        assert!(matches!(
            ExtractionRule::new(RuleField::Path, "^/static/"),
            Err(AnalyticsError::Configuration(_))
        ));
        assert!(matches!(
            ExtractionRule::new(RuleField::Path, "^/(unclosed"),
            Err(AnalyticsError::Configuration(_))
        ));
        let rule = ExtractionRule::new(RuleField::Path, r"^/user/([^/]+)").unwrap();
        let extractor = IdentityExtractor::with_rules(vec![rule]);
        assert_eq!(
            extractor.extract(&request("/user/bob/edit", "(none)")).unwrap().name,
            "bob"
        );
    }
}
