use anyhow::{Context, Result};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;

use crate::domain::{
    Category, CategoryId, CategoryType, Institution, InstitutionId, InstitutionType,
};

use super::repository::{LedgerTx, ensure_one, parse_id, parse_ts, ts};

impl LedgerTx {
    // ========================
    // Category operations
    // ========================

    pub async fn insert_category(&mut self, category: &Category) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query(
            r#"
            INSERT INTO categories (id, owner_id, name, icon, category_type, is_system, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(category.id.to_string())
        .bind(owner)
        .bind(&category.name)
        .bind(&category.icon)
        .bind(category.category_type.as_str())
        .bind(category.is_system)
        .bind(ts(&category.created_at))
        .execute(self.conn())
        .await
        .context("Failed to save category")?;
        Ok(())
    }

    pub async fn get_category(&mut self, id: CategoryId) -> Result<Option<Category>> {
        let owner = self.owner_key();
        let row = sqlx::query(
            "SELECT id, owner_id, name, icon, category_type, is_system, created_at FROM categories WHERE id = ? AND owner_id = ?",
        )
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch category")?;

        row.as_ref().map(row_to_category).transpose()
    }

    pub async fn list_categories(
        &mut self,
        category_type: Option<CategoryType>,
    ) -> Result<Vec<Category>> {
        let owner = self.owner_key();
        let rows = sqlx::query(
            r#"
            SELECT id, owner_id, name, icon, category_type, is_system, created_at
            FROM categories
            WHERE owner_id = ?1 AND (?2 IS NULL OR category_type = ?2)
            ORDER BY category_type, name
            "#,
        )
        .bind(owner)
        .bind(category_type.map(|t| t.as_str()))
        .fetch_all(self.conn())
        .await
        .context("Failed to list categories")?;

        rows.iter().map(row_to_category).collect()
    }

    pub async fn update_category(&mut self, category: &Category) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("UPDATE categories SET name = ?, icon = ? WHERE id = ? AND owner_id = ?")
            .bind(&category.name)
            .bind(&category.icon)
            .bind(category.id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to update category")?;

        ensure_one(result, "category", category.id)
    }

    pub async fn delete_category(&mut self, id: CategoryId) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("DELETE FROM categories WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to delete category")?;

        ensure_one(result, "category", id)
    }

    // ========================
    // Institution operations
    // ========================

    pub async fn insert_institution(&mut self, institution: &Institution) -> Result<()> {
        let owner = self.owner_key();
        sqlx::query(
            r#"
            INSERT INTO institutions (id, owner_id, name, institution_type, share_summary, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(institution.id.to_string())
        .bind(owner)
        .bind(&institution.name)
        .bind(institution.institution_type.as_str())
        .bind(institution.share_summary)
        .bind(ts(&institution.created_at))
        .execute(self.conn())
        .await
        .context("Failed to save institution")?;
        Ok(())
    }

    pub async fn get_institution(&mut self, id: InstitutionId) -> Result<Option<Institution>> {
        let owner = self.owner_key();
        let row = sqlx::query(
            "SELECT id, owner_id, name, institution_type, share_summary, created_at FROM institutions WHERE id = ? AND owner_id = ?",
        )
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(self.conn())
        .await
        .context("Failed to fetch institution")?;

        row.as_ref().map(row_to_institution).transpose()
    }

    pub async fn list_institutions(&mut self) -> Result<Vec<Institution>> {
        let owner = self.owner_key();
        let rows = sqlx::query(
            "SELECT id, owner_id, name, institution_type, share_summary, created_at FROM institutions WHERE owner_id = ? ORDER BY name",
        )
        .bind(owner)
        .fetch_all(self.conn())
        .await
        .context("Failed to list institutions")?;

        rows.iter().map(row_to_institution).collect()
    }

    pub async fn update_institution(&mut self, institution: &Institution) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query(
            "UPDATE institutions SET name = ?, share_summary = ? WHERE id = ? AND owner_id = ?",
        )
        .bind(&institution.name)
        .bind(institution.share_summary)
        .bind(institution.id.to_string())
        .bind(owner)
        .execute(self.conn())
        .await
        .context("Failed to update institution")?;

        ensure_one(result, "institution", institution.id)
    }

    pub async fn delete_institution(&mut self, id: InstitutionId) -> Result<()> {
        let owner = self.owner_key();
        let result = sqlx::query("DELETE FROM institutions WHERE id = ? AND owner_id = ?")
            .bind(id.to_string())
            .bind(owner)
            .execute(self.conn())
            .await
            .context("Failed to delete institution")?;

        ensure_one(result, "institution", id)
    }
}

fn row_to_category(row: &SqliteRow) -> Result<Category> {
    let type_str: String = row.get("category_type");

    Ok(Category {
        id: parse_id(&row.get::<String, _>("id"), "category")?,
        owner_id: parse_id(&row.get::<String, _>("owner_id"), "owner")?,
        name: row.get("name"),
        icon: row.get("icon"),
        category_type: CategoryType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid category type: {}", type_str))?,
        is_system: row.get::<i64, _>("is_system") != 0,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
    })
}

fn row_to_institution(row: &SqliteRow) -> Result<Institution> {
    let type_str: String = row.get("institution_type");

    Ok(Institution {
        id: parse_id(&row.get::<String, _>("id"), "institution")?,
        owner_id: parse_id(&row.get::<String, _>("owner_id"), "owner")?,
        name: row.get("name"),
        institution_type: InstitutionType::from_str(&type_str)
            .ok_or_else(|| anyhow::anyhow!("Invalid institution type: {}", type_str))?,
        share_summary: row.get::<i64, _>("share_summary") != 0,
        created_at: parse_ts(&row.get::<String, _>("created_at"), "created_at")?,
    })
}
