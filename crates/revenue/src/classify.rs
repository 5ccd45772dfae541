//! Keyword heuristics over free-text operational notes. Everything that
//! inspects remark or product text lives here.

use insights_core::config::RevenueConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemarkClass {
    Shoot,
    NamedEvent,
}

#[derive(Debug, Clone)]
pub struct Classifier {
    shoot: Vec<String>,
    named_event: Vec<String>,
    deposit: Vec<String>,
    excluded_services: Vec<String>,
}

impl Classifier {
    pub fn new(config: &RevenueConfig) -> Self {
        let lower = |words: &[String]| -> Vec<String> {
            words
                .iter()
                .map(|w| w.trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect()
        };
        Self {
            shoot: lower(&config.shoot_keywords),
            named_event: lower(&config.named_event_keywords),
            deposit: lower(&config.deposit_keywords),
            excluded_services: lower(&config.excluded_service_types),
        }
    }

    /// Shoot keywords are checked first; a remark matching both lists is a
    /// shoot.
    pub fn classify_remark(&self, text: Option<&str>) -> Option<RemarkClass> {
        let text = text?.to_lowercase();
        if contains_any(&text, &self.shoot) {
            Some(RemarkClass::Shoot)
        } else if contains_any(&text, &self.named_event) {
            Some(RemarkClass::NamedEvent)
        } else {
            None
        }
    }

    /// Product text carrying a deposit or final-payment line.
    pub fn is_deposit_line(&self, products: Option<&str>) -> bool {
        products.is_some_and(|p| contains_any(&p.to_lowercase(), &self.deposit))
    }

    pub fn is_excluded_service(&self, service_type: Option<&str>) -> bool {
        service_type.is_some_and(|s| {
            let s = s.trim().to_lowercase();
            self.excluded_services.iter().any(|e| *e == s)
        })
    }
}

fn contains_any(text: &str, keywords: &[String]) -> bool {
    keywords.iter().any(|k| text.contains(k.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> Classifier {
        Classifier::new(&RevenueConfig::default())
    }

    #[test]
    fn test_remark_classes() {
        let c = classifier();
        assert_eq!(c.classify_remark(Some("客户拍摄 2h")), Some(RemarkClass::Shoot));
        assert_eq!(c.classify_remark(Some("周末读书沙龙")), Some(RemarkClass::NamedEvent));
        assert_eq!(c.classify_remark(Some("Product SHOOT")), Some(RemarkClass::Shoot));
        assert_eq!(c.classify_remark(Some("普通预定")), None);
        assert_eq!(c.classify_remark(None), None);
    }

    #[test]
    fn test_overlapping_keywords_take_first_match() {
        let c = classifier();
        assert_eq!(c.classify_remark(Some("活动拍摄")), Some(RemarkClass::Shoot));
        assert_eq!(c.classify_remark(Some("event shoot")), Some(RemarkClass::Shoot));
    }

    #[test]
    fn test_deposit_and_excluded_services() {
        let c = classifier();
        assert!(c.is_deposit_line(Some("蛋糕定金 x1")));
        assert!(c.is_deposit_line(Some("Final Payment - party")));
        assert!(!c.is_deposit_line(Some("拿铁 x2")));
        assert!(c.is_excluded_service(Some(" 报损 ")));
        assert!(!c.is_excluded_service(Some("堂食")));
        assert!(!c.is_excluded_service(None));
    }
}
