/// Startup registration of query plans, cached by method name
use dashmap::DashMap;
use std::any::TypeId;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::log_debug;
use crate::shared::domain::Entity;
use crate::shared::errors::{AppError, AppResult};

use super::derived::DerivedQuery;
use super::explicit::ExplicitQuery;
use super::plan::{DefinitionSource, QueryDefinition, QueryHints, QueryPlan, QuerySource, ResultShape};
use super::projection::{View, ViewPlan};

/// Resolved plans for one entity type.
///
/// Registration parses and validates everything it can, so unknown
/// properties, placeholder mistakes and projection mismatches fail before
/// any statement runs. Plans are shared read-only afterwards.
pub struct QueryRegistry<E: Entity> {
    pub(crate) plans: DashMap<String, Arc<QueryPlan>>,
    named_queries: DashMap<String, String>,
    entity_graphs: DashMap<String, Vec<String>>,
    pub(crate) view_plans: DashMap<(String, TypeId), Arc<ViewPlan>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E: Entity> Default for QueryRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Entity> QueryRegistry<E> {
    pub fn new() -> Self {
        Self {
            plans: DashMap::new(),
            named_queries: DashMap::new(),
            entity_graphs: DashMap::new(),
            view_plans: DashMap::new(),
            _entity: PhantomData,
        }
    }

    /// Register SQL under a name such as `Member.findByUsername`.
    pub fn register_named_query(&self, name: &str, sql: &str) -> AppResult<()> {
        ExplicitQuery::parse(name, sql)?;
        self.named_queries.insert(name.to_string(), sql.to_string());
        Ok(())
    }

    /// Register a named set of relations to fetch, such as `Member.all` -> `team`.
    pub fn register_entity_graph(&self, name: &str, paths: &[&str]) -> AppResult<()> {
        for path in paths {
            self.check_fetch_path(name, path)?;
        }
        self.entity_graphs
            .insert(name.to_string(), paths.iter().map(|p| p.to_string()).collect());
        Ok(())
    }

    fn check_fetch_path(&self, query: &str, path: &str) -> AppResult<()> {
        let meta = E::meta();
        match meta.attribute(path) {
            Some(attribute) if attribute.target().is_some() => Ok(()),
            _ => Err(meta.unresolved(query, path)),
        }
    }

    fn lookup_named(&self, method: &str, name: &str) -> AppResult<String> {
        self.named_queries
            .get(name)
            .map(|sql| sql.value().clone())
            .ok_or_else(|| AppError::UnresolvedQuery {
                method: method.to_string(),
                token: name.to_string(),
                suggestion: closest(name, self.named_queries.iter().map(|e| e.key().clone())),
            })
    }

    /// Resolve a definition into a plan and cache it under its method name.
    pub fn register(&self, definition: QueryDefinition) -> AppResult<Arc<QueryPlan>> {
        let method = definition.method.clone();
        if self.plans.contains_key(&method) {
            return Err(AppError::InvalidInput(format!(
                "Query `{}` is already registered",
                method
            )));
        }

        let source = match &definition.source {
            DefinitionSource::Derived => QuerySource::Derived(DerivedQuery::parse(&method, E::meta())?),
            DefinitionSource::Explicit(sql) => QuerySource::Explicit(ExplicitQuery::parse(&method, sql)?),
            DefinitionSource::Named(name) => {
                let sql = self.lookup_named(&method, name)?;
                QuerySource::Explicit(ExplicitQuery::parse(&method, &sql)?)
            }
        };

        let mut fetch = definition.fetch.clone();
        if let Some(graph) = &definition.entity_graph {
            let paths = self
                .entity_graphs
                .get(graph)
                .map(|paths| paths.value().clone())
                .ok_or_else(|| AppError::UnresolvedQuery {
                    method: method.clone(),
                    token: graph.clone(),
                    suggestion: closest(graph, self.entity_graphs.iter().map(|e| e.key().clone())),
                })?;
            for path in paths {
                if !fetch.contains(&path) {
                    fetch.push(path);
                }
            }
        }
        for path in &fetch {
            self.check_fetch_path(&method, path)?;
        }

        let modifying = match (&source, definition.modifying) {
            (QuerySource::Explicit(query), Some(_)) if query.is_modifying() => true,
            (QuerySource::Explicit(query), None) if query.is_modifying() => {
                return Err(AppError::InvalidInput(format!(
                    "`{}` is an update statement and must be declared modifying",
                    method
                )));
            }
            (_, Some(_)) => {
                return Err(AppError::InvalidInput(format!(
                    "`{}` is declared modifying but is not an update statement",
                    method
                )));
            }
            (_, None) => false,
        };

        if let ResultShape::Constructor { name, fields, .. } = definition.shape {
            let explicit = match &source {
                QuerySource::Explicit(query) => query,
                QuerySource::Derived(_) => {
                    return Err(AppError::InvalidInput(format!(
                        "`{}`: constructor projections need an explicit query",
                        method
                    )));
                }
            };
            if let Some(actual) = explicit.select_arity() {
                if actual != fields.len() {
                    return Err(AppError::ProjectionArity {
                        projection: name.to_string(),
                        expected: fields.len(),
                        actual,
                    });
                }
            }
        }

        let count = match &definition.count_query {
            Some(sql) => {
                let query = ExplicitQuery::parse(&method, sql)?;
                if query.is_modifying() {
                    return Err(AppError::InvalidInput(format!(
                        "`{}`: count query must be a select",
                        method
                    )));
                }
                Some(query)
            }
            None => None,
        };

        let plan = Arc::new(QueryPlan {
            name: method.clone(),
            source,
            hints: QueryHints {
                fetch,
                read_only: definition.read_only,
                lock: definition.lock,
                clear_automatically: definition.modifying.unwrap_or(false),
            },
            count,
            shape: definition.shape,
            modifying,
        });

        log_debug!("Registered query {} for {}", method, E::meta().name);
        self.plans.insert(method, Arc::clone(&plan));
        Ok(plan)
    }

    pub fn plan(&self, method: &str) -> AppResult<Arc<QueryPlan>> {
        self.plans
            .get(method)
            .map(|plan| Arc::clone(plan.value()))
            .ok_or_else(|| AppError::UnresolvedQuery {
                method: method.to_string(),
                token: method.to_string(),
                suggestion: closest(method, self.plans.iter().map(|e| e.key().clone())),
            })
    }

    /// View mapping for a registered query, resolved on first use and cached.
    pub fn view_plan<V: View>(&self, method: &str) -> AppResult<Arc<ViewPlan>> {
        let key = (method.to_string(), TypeId::of::<V>());
        if let Some(existing) = self.view_plans.get(&key) {
            return Ok(Arc::clone(existing.value()));
        }
        let plan = self.plan(method)?;
        if plan.derived().is_none() {
            return Err(AppError::InvalidInput(format!(
                "`{}`: view projections need a derived query",
                method
            )));
        }
        let resolved = Arc::new(ViewPlan::resolve(&plan, E::meta(), V::shape())?);
        let cached = self.view_plans.entry(key).or_insert(resolved);
        Ok(Arc::clone(cached.value()))
    }

    /// Resolve a view mapping at startup so accessor mistakes fail fast.
    pub fn register_view<V: View>(&self, method: &str) -> AppResult<Arc<ViewPlan>> {
        self.view_plan::<V>(method)
    }

    pub fn len(&self) -> usize {
        self.plans.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plans.is_empty()
    }
}

fn closest(token: &str, candidates: impl Iterator<Item = String>) -> Option<String> {
    candidates
        .map(|candidate| (strsim::levenshtein(token, &candidate), candidate))
        .filter(|(distance, candidate)| *distance <= std::cmp::max(2, candidate.len() / 3))
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, candidate)| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::Member;
    use crate::modules::member::application::projections::MemberDto;
    use crate::shared::query::plan::LockMode;

    #[test]
    fn derived_plans_are_cached_by_name() {
        let registry = QueryRegistry::<Member>::new();
        registry
            .register(QueryDefinition::derived("findByUsernameAndAgeGreaterThan"))
            .unwrap();

        let plan = registry.plan("findByUsernameAndAgeGreaterThan").unwrap();
        assert!(plan.derived().is_some());
        assert!(registry
            .register(QueryDefinition::derived("findByUsernameAndAgeGreaterThan"))
            .is_err());
    }

    #[test]
    fn unknown_plans_suggest_registered_names() {
        let registry = QueryRegistry::<Member>::new();
        registry.register(QueryDefinition::derived("findTop3By")).unwrap();

        match registry.plan("findTop3Bx").unwrap_err() {
            AppError::UnresolvedQuery { suggestion, .. } => {
                assert_eq!(suggestion.as_deref(), Some("findTop3By"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn named_queries_and_graphs_resolve() {
        let registry = QueryRegistry::<Member>::new();
        registry
            .register_named_query(
                "Member.findByUsername",
                "SELECT m.* FROM member m WHERE m.username = :username",
            )
            .unwrap();
        registry.register_entity_graph("Member.all", &["team"]).unwrap();
        assert!(registry.register_entity_graph("Member.bad", &["username"]).is_err());

        let plan = registry
            .register(
                QueryDefinition::named("findByUserName", "Member.findByUsername")
                    .entity_graph("Member.all")
                    .lock(LockMode::PessimisticWrite),
            )
            .unwrap();
        assert_eq!(plan.hints.fetch, vec!["team".to_string()]);
        assert_eq!(plan.hints.lock, Some(LockMode::PessimisticWrite));

        assert!(registry
            .register(QueryDefinition::named("findMissing", "Member.findByUsernam"))
            .is_err());
    }

    #[test]
    fn update_statements_must_be_declared_modifying() {
        let registry = QueryRegistry::<Member>::new();
        let sql = "UPDATE member SET age = age + 1 WHERE age >= :age";
        assert!(registry
            .register(QueryDefinition::explicit("bulkAgePlus", sql))
            .is_err());

        let plan = registry
            .register(QueryDefinition::explicit("bulkAgePlus", sql).modifying(true))
            .unwrap();
        assert!(plan.modifying);
        assert!(plan.hints.clear_automatically);

        assert!(registry
            .register(QueryDefinition::explicit("notAnUpdate", "SELECT m.* FROM member m").modifying(false))
            .is_err());
    }

    #[test]
    fn constructor_projections_must_match_the_select_list() {
        let registry = QueryRegistry::<Member>::new();
        let err = registry
            .register(QueryDefinition::explicit("findNames", "SELECT m.username FROM member m").constructor::<MemberDto>())
            .unwrap_err();
        assert!(matches!(
            err,
            AppError::ProjectionArity { expected: 3, actual: 1, .. }
        ));
        assert!(registry.plan("findNames").is_err());

        // Star selects are not counted
        assert!(registry
            .register(QueryDefinition::explicit("findEverything", "SELECT * FROM member").constructor::<MemberDto>())
            .is_ok());
    }
}
