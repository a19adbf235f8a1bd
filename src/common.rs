use serde::Deserialize;

// 公共数据结构

/// 受限流与缓存治理的资源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Department,
    Professor,
    Student,
}

impl ResourceKind {
    /// 资源名，用于限流键和日志
    pub fn name(self) -> &'static str {
        match self {
            ResourceKind::Department => "department",
            ResourceKind::Professor => "professor",
            ResourceKind::Student => "student",
        }
    }

    /// 列表缓存键前缀
    pub fn cache_prefix(self) -> &'static str {
        match self {
            ResourceKind::Department => "departments",
            ResourceKind::Professor => "professors",
            ResourceKind::Student => "students",
        }
    }

    /// 列表查询是否支持按院系过滤
    pub fn accepts_department_filter(self) -> bool {
        !matches!(self, ResourceKind::Department)
    }

    /// 只保留会影响结果集的查询参数
    pub fn normalize(self, query: &ListQuery) -> ListQuery {
        ListQuery {
            limit: query.limit,
            department_id: query
                .department_id
                .filter(|_| self.accepts_department_filter()),
        }
    }

    /// 写入该资源后需要失效的缓存空间，自身排在最前。
    /// 列表结果内嵌了关联实体，所以关联资源的列表也会过期。
    pub fn invalidation_scope(self) -> &'static [ResourceKind] {
        match self {
            ResourceKind::Department => &[
                ResourceKind::Department,
                ResourceKind::Professor,
                ResourceKind::Student,
            ],
            ResourceKind::Professor => &[
                ResourceKind::Professor,
                ResourceKind::Department,
                ResourceKind::Student,
            ],
            ResourceKind::Student => &[
                ResourceKind::Student,
                ResourceKind::Department,
                ResourceKind::Professor,
            ],
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// 列表查询参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub department_id: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_department_ignores_department_filter() {
        let query = ListQuery {
            limit: Some(10),
            department_id: Some(3),
        };

        assert_eq!(
            ResourceKind::Department.normalize(&query),
            ListQuery {
                limit: Some(10),
                department_id: None,
            }
        );
        assert_eq!(ResourceKind::Student.normalize(&query), query);
    }

    const ALL: [ResourceKind; 3] = [
        ResourceKind::Department,
        ResourceKind::Professor,
        ResourceKind::Student,
    ];

    #[test]
    fn test_invalidation_scope_starts_with_self() {
        for resource in ALL {
            let scope = resource.invalidation_scope();
            assert_eq!(scope[0], resource);
            assert_eq!(scope.len(), ALL.len());
            for other in ALL {
                assert!(scope.contains(&other));
            }
        }
    }
}
