use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::AppError;
use crate::routes::department::{DEPARTMENT_SUMMARY_JSON, DepartmentSummary};
use crate::routes::professor::{PROFESSOR_SUMMARY_JSON, ProfessorSummary};
use crate::utils::is_valid_email;

/// 学生摘要的 JSON 构造表达式（表别名 s）
pub(crate) const STUDENT_SUMMARY_JSON: &str = "json_build_object('id', s.id, 'name', s.name, 'email', s.email, \
     'age', s.age, 'course', s.course, 'status', s.status, 'isEnroll', s.is_enroll, \
     'departmentId', s.department_id, 'professorId', s.professor_id)";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "UPPERCASE")]
#[sqlx(type_name = "student_status", rename_all = "UPPERCASE")]
pub enum StudentStatus {
    Active,
    Graduated,
    Dropped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub course: String,
    pub status: StudentStatus,
    pub is_enroll: bool,
    pub department_id: i32,
    pub professor_id: i32,
}

#[derive(Debug, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i32,
    pub name: String,
    pub email: String,
    pub age: i32,
    pub course: String,
    pub status: StudentStatus,
    pub is_enroll: bool,
    pub department_id: i32,
    pub professor_id: i32,
    #[sqlx(json)]
    pub department: DepartmentSummary,
    #[sqlx(json)]
    pub professor: ProfessorSummary,
}

/// 新建学生的状态固定为 ACTIVE
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStudentRequest {
    pub name: String,
    pub email: String,
    pub age: i32,
    pub course: String,
    pub is_enroll: bool,
    pub department_id: i32,
    pub professor_id: i32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStudentRequest {
    pub id: i32,
    pub name: Option<String>,
    pub email: Option<String>,
    pub age: Option<i32>,
    pub course: Option<String>,
    pub status: Option<StudentStatus>,
    pub is_enroll: Option<bool>,
    pub department_id: Option<i32>,
    pub professor_id: Option<i32>,
}

impl CreateStudentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("学生姓名不能为空".to_string()));
        }
        if !is_valid_email(&self.email) {
            return Err(AppError::Validation("邮箱格式无效".to_string()));
        }
        if self.age <= 0 {
            return Err(AppError::Validation("年龄必须为正数".to_string()));
        }
        if self.course.trim().is_empty() {
            return Err(AppError::Validation("课程不能为空".to_string()));
        }
        Ok(())
    }
}

impl UpdateStudentRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.as_deref().is_some_and(|name| name.trim().is_empty()) {
            return Err(AppError::Validation("学生姓名不能为空".to_string()));
        }
        if self.email.as_deref().is_some_and(|email| !is_valid_email(email)) {
            return Err(AppError::Validation("邮箱格式无效".to_string()));
        }
        if self.age.is_some_and(|age| age <= 0) {
            return Err(AppError::Validation("年龄必须为正数".to_string()));
        }
        if self.course.as_deref().is_some_and(|course| course.trim().is_empty()) {
            return Err(AppError::Validation("课程不能为空".to_string()));
        }
        Ok(())
    }
}

fn select_students(filter: &str) -> String {
    format!(
        r#"
        SELECT
            s.id, s.name, s.email, s.age, s.course, s.status, s.is_enroll,
            s.department_id, s.professor_id,
            {department} AS department,
            {professor} AS professor
        FROM students s
        JOIN departments d ON d.id = s.department_id
        JOIN professors p ON p.id = s.professor_id
        {filter}
        "#,
        department = DEPARTMENT_SUMMARY_JSON,
        professor = PROFESSOR_SUMMARY_JSON,
        filter = filter,
    )
}

impl Student {
    pub async fn find_many(
        pool: &PgPool,
        department_id: Option<i32>,
        limit: Option<i64>,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let sql = select_students(
            "WHERE ($1::int IS NULL OR s.department_id = $1) ORDER BY s.id LIMIT $2",
        );
        sqlx::query_as::<_, Student>(&sql)
            .bind(department_id)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    pub async fn find_by_id(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let sql = select_students("WHERE s.id = $1");
        sqlx::query_as::<_, Student>(&sql)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    pub async fn create(pool: &PgPool, req: CreateStudentRequest) -> Result<Self, sqlx::Error> {
        let id: i32 = sqlx::query_scalar(
            r#"
            INSERT INTO students (name, email, age, course, status, is_enroll, department_id, professor_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(req.name.trim())
        .bind(&req.email)
        .bind(req.age)
        .bind(req.course.trim())
        .bind(StudentStatus::Active)
        .bind(req.is_enroll)
        .bind(req.department_id)
        .bind(req.professor_id)
        .fetch_one(pool)
        .await?;

        Self::find_by_id(pool, id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    pub async fn update(
        pool: &PgPool,
        req: UpdateStudentRequest,
    ) -> Result<Option<Self>, sqlx::Error> {
        let updated: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE students
            SET name = COALESCE($2, name),
                email = COALESCE($3, email),
                age = COALESCE($4, age),
                course = COALESCE($5, course),
                status = COALESCE($6, status),
                is_enroll = COALESCE($7, is_enroll),
                department_id = COALESCE($8, department_id),
                professor_id = COALESCE($9, professor_id)
            WHERE id = $1
            RETURNING id
            "#,
        )
        .bind(req.id)
        .bind(req.name.as_deref().map(str::trim))
        .bind(req.email)
        .bind(req.age)
        .bind(req.course.as_deref().map(str::trim))
        .bind(req.status)
        .bind(req.is_enroll)
        .bind(req.department_id)
        .bind(req.professor_id)
        .fetch_optional(pool)
        .await?;

        match updated {
            Some(id) => Self::find_by_id(pool, id).await,
            None => Ok(None),
        }
    }

    pub async fn delete(pool: &PgPool, id: i32) -> Result<Option<Self>, sqlx::Error> {
        let Some(student) = Self::find_by_id(pool, id).await? else {
            return Ok(None);
        };

        let deleted = sqlx::query("DELETE FROM students WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?
            .rows_affected();

        // 并发删除时只有一方真正删掉了这一行
        if deleted == 0 {
            return Ok(None);
        }

        Ok(Some(student))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_request() -> CreateStudentRequest {
        CreateStudentRequest {
            name: "Alan Turing".to_string(),
            email: "alan@university.com".to_string(),
            age: 20,
            course: "Computer Science".to_string(),
            is_enroll: true,
            department_id: 1,
            professor_id: 1,
        }
    }

    #[test]
    fn test_status_uses_uppercase_names() {
        assert_eq!(
            serde_json::to_value(StudentStatus::Graduated).unwrap(),
            serde_json::json!("GRADUATED")
        );
        assert_eq!(
            serde_json::from_value::<StudentStatus>(serde_json::json!("DROPPED")).unwrap(),
            StudentStatus::Dropped
        );
        assert!(serde_json::from_value::<StudentStatus>(serde_json::json!("active")).is_err());
    }

    #[test]
    fn test_create_request_validation() {
        assert!(create_request().validate().is_ok());

        let req = CreateStudentRequest {
            age: 0,
            ..create_request()
        };
        assert!(req.validate().is_err());

        let req = CreateStudentRequest {
            email: "alan.university.com".to_string(),
            ..create_request()
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_update_request_reads_camel_case_fields() {
        let req: UpdateStudentRequest = serde_json::from_value(serde_json::json!({
            "id": 7,
            "isEnroll": false,
            "status": "GRADUATED",
        }))
        .unwrap();

        assert_eq!(req.is_enroll, Some(false));
        assert_eq!(req.status, Some(StudentStatus::Graduated));
        assert!(req.name.is_none());
        assert!(req.validate().is_ok());
    }
}
