/// Query definitions declared by repositories and the plans they resolve to
use std::any::TypeId;

use super::derived::DerivedQuery;
use super::explicit::ExplicitQuery;
use super::projection::ConstructorProjection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Relies on the transaction's read snapshot
    PessimisticRead,
    /// Takes the store's write lock before the select; held until the unit of work ends
    PessimisticWrite,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryHints {
    /// Relations loaded alongside the result, one batched select per path
    pub fetch: Vec<String>,
    /// Entities loaded by the query are not dirty-checked
    pub read_only: bool,
    pub lock: Option<LockMode>,
    /// Evict the modified table from the identity map after a modifying query
    pub clear_automatically: bool,
}

impl QueryHints {
    pub fn fetches(&self, path: &str) -> bool {
        self.fetch.iter().any(|p| p == path)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    Entity,
    Constructor {
        name: &'static str,
        fields: &'static [&'static str],
        type_id: TypeId,
    },
}

#[derive(Debug, Clone)]
pub(crate) enum DefinitionSource {
    Derived,
    Explicit(String),
    Named(String),
}

/// A repository method's query, declared once and resolved at registration.
///
/// ```ignore
/// registry.register(QueryDefinition::derived("findByUsernameAndAgeGreaterThan"))?;
/// registry.register(
///     QueryDefinition::explicit("bulkAgePlus", "UPDATE member SET age = age + 1 WHERE age >= :age")
///         .modifying(true),
/// )?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryDefinition {
    pub(crate) method: String,
    pub(crate) source: DefinitionSource,
    pub(crate) fetch: Vec<String>,
    pub(crate) entity_graph: Option<String>,
    pub(crate) read_only: bool,
    pub(crate) lock: Option<LockMode>,
    pub(crate) modifying: Option<bool>,
    pub(crate) count_query: Option<String>,
    pub(crate) shape: ResultShape,
}

impl QueryDefinition {
    fn new(method: &str, source: DefinitionSource) -> Self {
        Self {
            method: method.to_string(),
            source,
            fetch: Vec::new(),
            entity_graph: None,
            read_only: false,
            lock: None,
            modifying: None,
            count_query: None,
            shape: ResultShape::Entity,
        }
    }

    /// Query parsed from the method name itself.
    pub fn derived(method: &str) -> Self {
        Self::new(method, DefinitionSource::Derived)
    }

    /// SQL text run as written. A call-time sort or page window wraps it as
    /// `SELECT * FROM (sql) AS q`; SQLite does not carry an inner `ORDER BY`
    /// through that wrapper, so pageable queries should leave ordering to the
    /// `Sort`.
    pub fn explicit(method: &str, sql: &str) -> Self {
        Self::new(method, DefinitionSource::Explicit(sql.to_string()))
    }

    /// Query text registered separately under `name`.
    pub fn named(method: &str, name: &str) -> Self {
        Self::new(method, DefinitionSource::Named(name.to_string()))
    }

    pub fn fetch(mut self, path: &str) -> Self {
        self.fetch.push(path.to_string());
        self
    }

    pub fn entity_graph(mut self, name: &str) -> Self {
        self.entity_graph = Some(name.to_string());
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn lock(mut self, mode: LockMode) -> Self {
        self.lock = Some(mode);
        self
    }

    pub fn modifying(mut self, clear_automatically: bool) -> Self {
        self.modifying = Some(clear_automatically);
        self
    }

    pub fn count_query(mut self, sql: &str) -> Self {
        self.count_query = Some(sql.to_string());
        self
    }

    pub fn constructor<P: ConstructorProjection>(mut self) -> Self {
        self.shape = ResultShape::Constructor {
            name: P::NAME,
            fields: P::FIELDS,
            type_id: TypeId::of::<P>(),
        };
        self
    }

    pub fn method(&self) -> &str {
        &self.method
    }
}

#[derive(Debug, Clone)]
pub enum QuerySource {
    Derived(DerivedQuery),
    Explicit(ExplicitQuery),
}

/// A resolved query, cached by method name.
#[derive(Debug, Clone)]
pub struct QueryPlan {
    pub name: String,
    pub source: QuerySource,
    pub hints: QueryHints,
    pub count: Option<ExplicitQuery>,
    pub shape: ResultShape,
    pub modifying: bool,
}

impl QueryPlan {
    pub fn derived(&self) -> Option<&DerivedQuery> {
        match &self.source {
            QuerySource::Derived(query) => Some(query),
            QuerySource::Explicit(_) => None,
        }
    }

    pub fn explicit(&self) -> Option<&ExplicitQuery> {
        match &self.source {
            QuerySource::Explicit(query) => Some(query),
            QuerySource::Derived(_) => None,
        }
    }
}
