//! JOIN clause types.

use crate::expr::Op;
use sqlrecord_core::Dialect;

/// Types of SQL joins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinType {
    /// Get the SQL keyword for this join type.
    pub const fn as_str(&self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Cross => "CROSS JOIN",
        }
    }
}

/// Column-to-column ON condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinOn {
    pub first: String,
    pub op: Op,
    pub second: String,
}

/// A JOIN clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub join_type: JoinType,
    pub table: String,
    pub alias: Option<String>,
    /// Empty for CROSS JOIN
    pub on: Vec<JoinOn>,
}

impl Join {
    pub fn new(
        join_type: JoinType,
        table: impl Into<String>,
        first: impl Into<String>,
        op: Op,
        second: impl Into<String>,
    ) -> Self {
        Self {
            join_type,
            table: table.into(),
            alias: None,
            on: vec![JoinOn {
                first: first.into(),
                op,
                second: second.into(),
            }],
        }
    }

    /// Create a CROSS JOIN.
    pub fn cross(table: impl Into<String>) -> Self {
        Self {
            join_type: JoinType::Cross,
            table: table.into(),
            alias: None,
            on: Vec::new(),
        }
    }

    /// Set the joined table's alias.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Add another ANDed ON condition.
    pub fn and_on(mut self, first: impl Into<String>, op: Op, second: impl Into<String>) -> Self {
        self.on.push(JoinOn {
            first: first.into(),
            op,
            second: second.into(),
        });
        self
    }

    /// Generate SQL for this JOIN clause, with a leading space.
    pub fn to_sql(&self, dialect: Dialect) -> String {
        let mut sql = format!(" {} {}", self.join_type.as_str(), dialect.quote_column(&self.table));
        if let Some(alias) = &self.alias {
            sql.push_str(" AS ");
            sql.push_str(&dialect.quote_identifier(alias));
        }
        if !self.on.is_empty() {
            let conditions: Vec<String> = self
                .on
                .iter()
                .map(|on| {
                    on.op.render(
                        dialect,
                        &dialect.quote_column(&on.first),
                        &dialect.quote_column(&on.second),
                    )
                })
                .collect();
            sql.push_str(" ON ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inner_join_sql() {
        let join = Join::new(JoinType::Inner, "posts", "users.id", Op::Eq, "posts.user_id");
        assert_eq!(
            join.to_sql(Dialect::Postgres),
            " INNER JOIN \"posts\" ON \"users\".\"id\" = \"posts\".\"user_id\""
        );
    }

    #[test]
    fn test_left_join_with_alias_and_extra_condition() {
        let join = Join::new(JoinType::Left, "comments", "c.post_id", Op::Eq, "posts.id")
            .alias("c")
            .and_on("c.author_id", Op::Ne, "posts.user_id");
        assert_eq!(
            join.to_sql(Dialect::Mysql),
            " LEFT JOIN `comments` AS `c` ON `c`.`post_id` = `posts`.`id` AND `c`.`author_id` <> `posts`.`user_id`"
        );
    }

    #[test]
    fn test_cross_join_has_no_condition() {
        assert_eq!(Join::cross("tags").to_sql(Dialect::Sqlite), " CROSS JOIN \"tags\"");
    }
}
