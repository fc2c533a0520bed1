use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::OwnerId;

pub type CategoryId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryType {
    Income,
    Expense,
}

impl CategoryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CategoryType::Income => "income",
            CategoryType::Expense => "expense",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "income" => Some(CategoryType::Income),
            "expense" => Some(CategoryType::Expense),
            _ => None,
        }
    }
}

impl std::fmt::Display for CategoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub owner_id: OwnerId,
    pub name: String,
    pub icon: Option<String>,
    pub category_type: CategoryType,
    /// Seeded categories cannot be renamed or removed
    pub is_system: bool,
    pub created_at: DateTime<Utc>,
}

impl Category {
    pub fn new(owner_id: OwnerId, name: String, category_type: CategoryType) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name,
            icon: None,
            category_type,
            is_system: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_icon(mut self, icon: Option<String>) -> Self {
        self.icon = icon;
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system = true;
        self
    }
}

/// Categories seeded for a new owner: (name, icon, type).
pub const DEFAULT_CATEGORIES: &[(&str, &str, CategoryType)] = &[
    ("Salary", "💼", CategoryType::Income),
    ("Freelance", "💻", CategoryType::Income),
    ("Investments", "📈", CategoryType::Income),
    ("Other Income", "💰", CategoryType::Income),
    ("Food", "🍔", CategoryType::Expense),
    ("Transport", "🚗", CategoryType::Expense),
    ("Housing", "🏠", CategoryType::Expense),
    ("Utilities", "💡", CategoryType::Expense),
    ("Health", "🏥", CategoryType::Expense),
    ("Entertainment", "🎬", CategoryType::Expense),
    ("Education", "📚", CategoryType::Expense),
    ("Clothing", "👕", CategoryType::Expense),
    ("Gifts", "🎁", CategoryType::Expense),
    ("Other Expenses", "📦", CategoryType::Expense),
];

/// Default categories for `owner_id`, skipping names already taken.
pub fn default_categories(owner_id: OwnerId, existing_names: &[String]) -> Vec<Category> {
    DEFAULT_CATEGORIES
        .iter()
        .filter(|(name, _, _)| !existing_names.iter().any(|n| n.eq_ignore_ascii_case(name)))
        .map(|(name, icon, category_type)| {
            Category::new(owner_id, (*name).to_string(), *category_type)
                .with_icon(Some((*icon).to_string()))
                .system()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_categories_are_system() {
        let categories = default_categories(Uuid::new_v4(), &[]);
        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len());
        assert!(categories.iter().all(|c| c.is_system));
        assert_eq!(
            categories
                .iter()
                .filter(|c| c.category_type == CategoryType::Income)
                .count(),
            4
        );
    }

    #[test]
    fn test_default_categories_skip_existing_names() {
        let categories = default_categories(Uuid::new_v4(), &["food".to_string()]);
        assert_eq!(categories.len(), DEFAULT_CATEGORIES.len() - 1);
        assert!(categories.iter().all(|c| c.name != "Food"));
    }
}
