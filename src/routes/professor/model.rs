use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::routes::department::{DEPARTMENT_SUMMARY_JSON, DepartmentSummary};
use crate::routes::student::{STUDENT_SUMMARY_JSON, StudentSummary};
use crate::utils::is_valid_email;

/// 教师摘要的 JSON 构造表达式（表别名 p）
pub(crate) const PROFESSOR_SUMMARY_JSON: &str = "json_build_object('id', p.id, 'name', p.name, 'email', p.email, \
     'degree', p.degree, 'departmentId', p.department_id)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "degree")]
pub enum Degree {
    Bachelor,
    Masteral,
    Doctoral,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfessorSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub degree: Degree,
    pub department_id: i32,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Professor {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub degree: Degree,
    pub department_id: i32,
    #[sqlx(json)]
    pub department: DepartmentSummary,
    #[sqlx(json)]
    pub students: Vec<StudentSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfessorRequest {
    pub name: String,
    pub email: String,
    pub degree: Degree,
    pub department_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfessorRequest {
    pub id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
    pub degree: Option<Degree>,
    pub department_id: Option<i32>,
}

impl CreateProfessorRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("教师姓名不能为空".to_string()));
        }
        if !is_valid_email(&self.email) {
            return Err(AppError::Validation("邮箱格式无效".to_string()));
        }
        Ok(())
    }
}

impl UpdateProfessorRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(AppError::Validation("教师姓名不能为空".to_string()));
        }
        if self.email.as_deref().is_some_and(|email| !is_valid_email(email)) {
            return Err(AppError::Validation("邮箱格式无效".to_string()));
        }
        Ok(())
    }
}

fn select_professors(filter: &str) -> String {
    format!(
        r#"
        SELECT
            p.id, p.name, p.email, p.degree, p.department_id,
            {department} AS department,
            COALESCE((
                SELECT json_agg({student} ORDER BY s.id)
                FROM students s
                WHERE s.professor_id = p.id
            ), '[]'::json) AS students
        FROM professors p
        JOIN departments d ON d.id = p.department_id
        {filter}
        "#,
        department = DEPARTMENT_SUMMARY_JSON,
        student = STUDENT_SUMMARY_JSON,
        filter = filter,
    )
}

impl Professor {
    /// `department_id` 为 `None` 时不过滤
    pub async fn find_many(
        pool: &PgPool,
        department_id: Option<i32>,
        limit: Option<i64>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = select_professors(
            "WHERE ($1::int IS NULL OR p.department_id = $1) ORDER BY p.id LIMIT $2",
        );
        sqlx::query_as::<_, Professor>(&sql)
            .bind(department_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let sql = select_professors("WHERE p.id = $1");
        sqlx::query_as::<_, Professor>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &PgPool, req: CreateProfessorRequest) -> Result<Self, sqlx::Error> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO professors (name, email, degree, department_id)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(req.name.trim())
        .bind(&req.email)
        .bind(req.degree)
        .bind(req.department_id)
        .fetch_one(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update(
        pool: &PgPool,
        req: UpdateProfessorRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE professors
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                degree = COALESCE($4, degree),
                department_id = COALESCE($5, department_id)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(req.id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.email)
        .bind(req.degree)
        .bind(req.department_id)
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(id) => Self::find_by_id(pool, id).await,
            None => Ok(None),
        }
    }

    pub async fn delete(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let Some(professor) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let deleted = sqlx::query("DELETE FROM professors WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        // 并发删除时只有一方真正删掉了这一行
        if deleted == 0 {
            return Ok(None);
        }

        Ok(Some(professor))
    }
}
