//! The per-cluster match-conditions document.
use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

/// A rule object: a mapping of rule names to scalar payloads.
///
/// Rule names are case-insensitive and validated by the owning domain
/// evaluator, which warns about names it does not recognise.
pub type RuleObject = Map<String, Value>;

/// Ordered collection of service blocks alerting is configured from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchConditions {
    pub services: Vec<ServiceBlock>,
}

impl MatchConditions {
    /// An empty document with one block per known service, in the order the
    /// monitor evaluates them.
    pub fn empty() -> MatchConditions {
        let services = ["systemHealth", "ems", "snapmirror", "storage", "quota", "vserver"]
            .iter()
            .map(|name| ServiceBlock {
                name: name.to_string(),
                rules: Vec::new(),
            })
            .collect();
        MatchConditions { services }
    }

    /// Mutable access to the named service block, if present.
    pub fn service_mut(&mut self, name: &str) -> Option<&mut ServiceBlock> {
        self.services.iter_mut().find(|block| block.name == name)
    }
}

/// Rules for one service domain.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ServiceBlock {
    pub name: String,
    pub rules: Vec<RuleObject>,
}

impl ServiceBlock {
    /// Append a rule object built from a single key/value pair.
    pub fn push_rule<V: Into<Value>>(&mut self, key: &str, value: V) {
        let mut rule = RuleObject::new();
        rule.insert(key.to_string(), value.into());
        self.rules.push(rule);
    }
}

#[cfg(test)]
mod tests {
    use super::MatchConditions;

    #[test]
    fn empty_document_lists_all_services_in_order() {
        let conditions = MatchConditions::empty();
        let names: Vec<&str> = conditions
            .services
            .iter()
            .map(|block| block.name.as_str())
            .collect();
        assert_eq!(
            names,
            ["systemHealth", "ems", "snapmirror", "storage", "quota", "vserver"]
        );
    }

    #[test]
    fn decode_document() {
        let conditions: MatchConditions = serde_json::from_value(serde_json::json!({
            "services": [
                {"name": "ems", "rules": [
                    {"name": "raid", "severity": "ERROR", "message": ".*", "filter": ""},
                ]},
            ],
        }))
        .unwrap();
        assert_eq!(conditions.services.len(), 1);
        assert_eq!(conditions.services[0].rules.len(), 1);
    }

    #[test]
    fn push_rule_builds_single_pair_objects() {
        let mut conditions = MatchConditions::empty();
        let block = conditions.service_mut("storage").unwrap();
        block.push_rule("aggrWarnPercentUsed", 80);
        assert_eq!(
            serde_json::to_value(&block.rules).unwrap(),
            serde_json::json!([{"aggrWarnPercentUsed": 80}])
        );
    }
}
