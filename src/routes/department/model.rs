use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::routes::professor::{PROFESSOR_SUMMARY_JSON, ProfessorSummary};
use crate::routes::student::{STUDENT_SUMMARY_JSON, StudentSummary};
use crate::utils::is_valid_email;

/// 院系摘要的 JSON 构造表达式，供其他实体内嵌院系时使用（表别名 d）
pub(crate) const DEPARTMENT_SUMMARY_JSON: &str =
    "json_build_object('id', d.id, 'name', d.name, 'email', d.email, 'year', d.year)";

/// 内嵌在教师、学生里的院系信息
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub year: i32,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub year: i32,
    #[sqlx(json)]
    pub professors: Vec<ProfessorSummary>,
    #[sqlx(json)]
    pub students: Vec<StudentSummary>,
}

#[derive(Debug, Deserialize)]
pub struct CreateDepartmentRequest {
    pub name: String,
    pub email: String,
    pub year: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDepartmentRequest {
    pub id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
    pub year: Option<i32>,
}

impl CreateDepartmentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("院系名称不能为空".to_string()));
        }
        if !is_valid_email(&self.email) {
            return Err(AppError::Validation("邮箱格式无效".to_string()));
        }
        Ok(())
    }
}

impl UpdateDepartmentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(AppError::Validation("院系名称不能为空".to_string()));
        }
        if self.email.as_deref().is_some_and(|email| !is_valid_email(email)) {
            return Err(AppError::Validation("邮箱格式无效".to_string()));
        }
        Ok(())
    }
}

// 院系连同其教师、学生一起查询
fn select_departments(filter: &str) -> String {
    format!(
        r#"
        SELECT
            d.id, d.name, d.email, d.year,
            COALESCE((
                SELECT json_agg({professor} ORDER BY p.id)
                FROM professors p
                WHERE p.department_id = d.id
            ), '[]'::json) AS professors,
            COALESCE((
                SELECT json_agg({student} ORDER BY s.id)
                FROM students s
                WHERE s.department_id = d.id
            ), '[]'::json) AS students
        FROM departments d
        {filter}
        "#,
        professor = PROFESSOR_SUMMARY_JSON,
        student = STUDENT_SUMMARY_JSON,
        filter = filter,
    )
}

impl Department {
    pub async fn find_many(pool: &PgPool, limit: Option<i64>) -> Result<Vec<Self>, sqlx::Error> {
        let sql = select_departments("ORDER BY d.id LIMIT $1");
        sqlx::query_as::<_, Department>(&sql)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let sql = select_departments("WHERE d.id = $1");
        sqlx::query_as::<_, Department>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &PgPool, req: CreateDepartmentRequest) -> Result<Self, sqlx::Error> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO departments (name, email, year)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
        )
        .bind(req.name.trim())
        .bind(&req.email)
        .bind(req.year)
        .fetch_one(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    /// 只更新请求里出现的字段；院系不存在时返回 `None`
    pub async fn update(
        pool: &PgPool,
        req: UpdateDepartmentRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE departments
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                year = COALESCE($4, year)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(req.id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.email)
        .bind(req.year)
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(id) => Self::find_by_id(pool, id).await,
            None => Ok(None),
        }
    }

    /// 删除并返回被删除的院系；仍有教师或学生关联时由外键约束拒绝
    pub async fn delete(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let Some(department) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let deleted = sqlx::query("DELETE FROM departments WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        // 并发删除时只有一方真正删掉了这一行
        if deleted == 0 {
            return Ok(None);
        }

        Ok(Some(department))
    }
}
