/// Per-call binding and execution of registered plans in each return shape
use std::any::TypeId;

use crate::log_debug;
use crate::shared::application::pagination::{Page, PageRequest, Slice, Sort};
use crate::shared::domain::{Args, Entity, EntityMeta, Managed, Value};
use crate::shared::errors::{AppError, AppResult};
use crate::shared::infrastructure::unit_of_work::UnitOfWork;

use super::derived::{DerivedQuery, QueryAction};
use super::explicit::{ExplicitQuery, StatementKind};
use super::plan::{LockMode, QueryPlan, ResultShape};
use super::projection::{ConstructorProjection, View, ViewPlan};
use super::registry::QueryRegistry;
use super::specification::Specification;
use super::sql::{BoundQuery, CountRow, JoinKind, SelectBuilder, Window, ROOT_ALIAS};

#[derive(Clone, Copy)]
enum Selection<'a> {
    Entities,
    Count,
    View(&'a ViewPlan),
}

fn combined_sort(static_sort: &Sort, call_sort: &Sort) -> Sort {
    call_sort
        .orders()
        .iter()
        .cloned()
        .fold(static_sort.clone(), Sort::and)
}

/// `TopN` bounds the whole result: a window starting at or past `N` is empty.
fn capped(window: Window, limit: Option<u64>) -> Window {
    match limit {
        Some(top) => {
            let remaining = top.saturating_sub(window.offset);
            Window {
                offset: window.offset,
                limit: Some(window.limit.map_or(remaining, |l| l.min(remaining))),
            }
        }
        None => window,
    }
}

fn first_count(rows: Vec<CountRow>) -> u64 {
    rows.first().map(|row| row.count.max(0) as u64).unwrap_or(0)
}

fn wrong_shape(plan: &QueryPlan, expected: &str) -> AppError {
    AppError::InvalidInput(format!("`{}` cannot be executed as {}", plan.name, expected))
}

/// Render a derived query over the root entity.
fn derived_statement(
    plan: &QueryPlan,
    query: &DerivedQuery,
    meta: &'static EntityMeta,
    args: &Args,
    selection: Selection<'_>,
    sort: &Sort,
    window: Window,
) -> AppResult<BoundQuery> {
    if args.has_named() {
        return Err(AppError::ParameterBinding(format!(
            "`{}` is derived from its name and takes positional arguments",
            plan.name
        )));
    }
    let predicate = query.bind(args.positional())?;
    let mut builder = SelectBuilder::new(&plan.name, meta);

    let select_list = match selection {
        Selection::Entities if query.distinct => {
            format!("DISTINCT {}", meta.select_columns(ROOT_ALIAS))
        }
        Selection::Entities => meta.select_columns(ROOT_ALIAS),
        Selection::Count if query.distinct => {
            format!("COUNT(DISTINCT {}.{}) AS count", ROOT_ALIAS, meta.id_column)
        }
        Selection::Count => "COUNT(*) AS count".to_string(),
        Selection::View(view_plan) => view_plan.select_list(&mut builder)?,
    };

    let where_clause = if predicate.is_always() {
        String::new()
    } else {
        format!(" WHERE {}", predicate.render(&mut builder, JoinKind::Left)?)
    };

    let (order, window_sql) = match selection {
        Selection::Count => (String::new(), String::new()),
        _ => (
            builder.order_clause(&combined_sort(&query.sort, sort))?,
            builder.window_clause(capped(window, query.limit)),
        ),
    };

    let sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_list,
        builder.from_clause(),
        where_clause,
        order,
        window_sql
    );
    Ok(builder.finish(sql))
}

/// Explicit SQL, wrapped in an outer select when the call adds a sort or a window.
fn explicit_statement(
    plan: &QueryPlan,
    query: &ExplicitQuery,
    args: &Args,
    sortable: &dyn Fn(&str) -> Option<String>,
    sort: &Sort,
    window: Window,
) -> AppResult<BoundQuery> {
    let bound = query.bind(&plan.name, args, true)?;
    if sort.is_unsorted() && window == Window::default() {
        return Ok(bound);
    }

    let mut sql = format!("SELECT * FROM ({}) AS q", bound.sql);
    let mut binds = bound.binds;

    if !sort.is_unsorted() {
        let mut keys = Vec::with_capacity(sort.orders().len());
        for order in sort.orders() {
            let column = sortable(&order.property).ok_or_else(|| AppError::UnresolvedQuery {
                method: plan.name.clone(),
                token: order.property.clone(),
                suggestion: None,
            })?;
            keys.push(format!("q.{} {}", column, order.direction.as_sql()));
        }
        sql.push_str(&format!(" ORDER BY {}", keys.join(", ")));
    }

    match window.limit {
        Some(limit) => {
            sql.push_str(" LIMIT ? OFFSET ?");
            binds.push(Value::Int(limit as i64));
            binds.push(Value::Int(window.offset as i64));
        }
        None if window.offset > 0 => {
            sql.push_str(" LIMIT -1 OFFSET ?");
            binds.push(Value::Int(window.offset as i64));
        }
        None => {}
    }

    Ok(BoundQuery::new(plan.name.clone(), sql, binds))
}

fn explicit_count(plan: &QueryPlan, query: &ExplicitQuery, args: &Args) -> AppResult<BoundQuery> {
    match &plan.count {
        Some(count) => {
            let bound = count.bind(&plan.name, args, false)?;
            Ok(BoundQuery::new(
                format!("{}.count", plan.name),
                format!("SELECT ({}) AS count", bound.sql),
                bound.binds,
            ))
        }
        None => {
            let bound = query.bind(&plan.name, args, true)?;
            Ok(BoundQuery::new(
                format!("{}.count", plan.name),
                format!("SELECT COUNT(*) AS count FROM ({}) AS q", bound.sql),
                bound.binds,
            ))
        }
    }
}

impl<E: Entity> QueryRegistry<E> {
    fn entity_plan(&self, method: &str) -> AppResult<std::sync::Arc<QueryPlan>> {
        let plan = self.plan(method)?;
        if plan.modifying || plan.shape != ResultShape::Entity {
            return Err(wrong_shape(&plan, "an entity query"));
        }
        if let Some(derived) = plan.derived() {
            if derived.action != QueryAction::Select {
                return Err(wrong_shape(&plan, "an entity query"));
            }
        }
        Ok(plan)
    }

    fn content(&self, plan: &QueryPlan, args: &Args, sort: &Sort, window: Window) -> AppResult<BoundQuery> {
        match plan.derived() {
            Some(derived) => derived_statement(
                plan,
                derived,
                E::meta(),
                args,
                Selection::Entities,
                sort,
                window,
            ),
            None => {
                let explicit = self.explicit_of(plan)?;
                let sortable = |property: &str| {
                    E::meta()
                        .attribute(property)
                        .map(|attribute| attribute.column.to_string())
                };
                explicit_statement(plan, explicit, args, &sortable, sort, window)
            }
        }
    }

    fn explicit_of<'p>(&self, plan: &'p QueryPlan) -> AppResult<&'p ExplicitQuery> {
        plan.explicit()
            .ok_or_else(|| AppError::InternalError(format!("`{}` has no statement", plan.name)))
    }

    fn count_plan(&self, uow: &mut UnitOfWork<'_>, plan: &QueryPlan, args: &Args) -> AppResult<u64> {
        let statement = match plan.derived() {
            Some(derived) => derived_statement(
                plan,
                derived,
                E::meta(),
                args,
                Selection::Count,
                &Sort::unsorted(),
                Window::default(),
            )?,
            None => explicit_count(plan, self.explicit_of(plan)?, args)?,
        };
        let total = first_count(uow.query_rows::<CountRow>(&statement)?);
        Ok(match plan.derived().and_then(|d| d.limit) {
            Some(top) => total.min(top),
            None => total,
        })
    }

    fn load(&self, uow: &mut UnitOfWork<'_>, plan: &QueryPlan, content: &BoundQuery) -> AppResult<Vec<Managed<E>>> {
        match plan.hints.lock {
            Some(LockMode::PessimisticWrite) => {
                let locked = uow.lock::<E>(content)?;
                log_debug!("{}: write lock taken on {} row(s)", plan.name, locked);
            }
            Some(LockMode::PessimisticRead) => {
                log_debug!("{}: read lock served by the transaction snapshot", plan.name);
            }
            None => {}
        }

        let entities = uow.query_entities::<E>(content, plan.hints.read_only)?;
        if !entities.is_empty() {
            for path in &plan.hints.fetch {
                E::fetch_graph(uow, &entities, path)?;
            }
        }
        Ok(entities)
    }

    pub fn list(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<Vec<Managed<E>>> {
        self.list_sorted(uow, method, args, &Sort::unsorted())
    }

    pub fn list_sorted(
        &self,
        uow: &mut UnitOfWork<'_>,
        method: &str,
        args: Args,
        sort: &Sort,
    ) -> AppResult<Vec<Managed<E>>> {
        let plan = self.entity_plan(method)?;
        let content = self.content(&plan, &args, sort, Window::default())?;
        self.load(uow, &plan, &content)
    }

    /// Zero or one entity; more than one matching row is an error.
    pub fn optional(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<Option<Managed<E>>> {
        let mut found = self.list(uow, method, args)?;
        if found.len() > 1 {
            return Err(AppError::IncorrectResultSize {
                expected: 1,
                actual: found.len(),
            }
            .in_query(method));
        }
        Ok(found.pop())
    }

    pub fn page(
        &self,
        uow: &mut UnitOfWork<'_>,
        method: &str,
        args: Args,
        request: &PageRequest,
    ) -> AppResult<Page<Managed<E>>> {
        let plan = self.entity_plan(method)?;
        let window = Window::range(request.offset(), request.size() as u64);
        let content = self.content(&plan, &args, request.sort(), window)?;
        let entities = self.load(uow, &plan, &content)?;
        let total = request.resolve_total(entities.len(), || self.count_plan(uow, &plan, &args))?;
        Ok(Page::new(entities, request, total))
    }

    /// Fetches one row past the page to learn whether another page exists.
    pub fn slice(
        &self,
        uow: &mut UnitOfWork<'_>,
        method: &str,
        args: Args,
        request: &PageRequest,
    ) -> AppResult<Slice<Managed<E>>> {
        let plan = self.entity_plan(method)?;
        let window = Window::range(request.offset(), request.size() as u64 + 1);
        let content = self.content(&plan, &args, request.sort(), window)?;
        let entities = self.load(uow, &plan, &content)?;
        Ok(Slice::from_overfetch(entities, request))
    }

    pub fn count(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<u64> {
        let plan = self.plan(method)?;
        if plan.modifying {
            return Err(wrong_shape(&plan, "a count"));
        }
        self.count_plan(uow, &plan, &args)
    }

    pub fn exists(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<bool> {
        let plan = self.plan(method)?;
        if plan.modifying {
            return Err(wrong_shape(&plan, "an existence check"));
        }
        let content = match plan.derived() {
            Some(derived) => derived_statement(
                &plan,
                derived,
                E::meta(),
                &args,
                Selection::Entities,
                &Sort::unsorted(),
                Window::limit(1),
            )?,
            None => explicit_statement(
                &plan,
                self.explicit_of(&plan)?,
                &args,
                &|_| None,
                &Sort::unsorted(),
                Window::limit(1),
            )?,
        };
        let probe = BoundQuery::new(
            format!("{}.exists", plan.name),
            format!("SELECT COUNT(*) AS count FROM ({}) AS q", content.sql),
            content.binds,
        );
        Ok(first_count(uow.query_rows::<CountRow>(&probe)?) > 0)
    }

    /// Derived `delete...By`: loads the matches and removes each one through the unit of work.
    pub fn delete(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<usize> {
        let plan = self.plan(method)?;
        let derived = match plan.derived() {
            Some(derived) if derived.action == QueryAction::Delete => derived,
            _ => return Err(wrong_shape(&plan, "a derived delete")),
        };
        let content = derived_statement(
            &plan,
            derived,
            E::meta(),
            &args,
            Selection::Entities,
            &Sort::unsorted(),
            Window::default(),
        )?;
        let entities = self.load(uow, &plan, &content)?;
        for entity in &entities {
            uow.remove(entity)?;
        }
        Ok(entities.len())
    }

    /// Run a modifying statement and return the affected row count.
    ///
    /// Managed instances are not refreshed. With `clear_automatically` the
    /// statement's table is evicted so later lookups reload from the store.
    pub fn modify(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<usize> {
        let plan = self.plan(method)?;
        let explicit = match plan.explicit() {
            Some(explicit) if plan.modifying => explicit,
            _ => return Err(wrong_shape(&plan, "a modifying query")),
        };
        let bound = explicit.bind(&plan.name, &args, true)?;
        uow.flush()?;
        let affected = uow.execute(&bound)?;

        if plan.hints.clear_automatically {
            if let StatementKind::Modify { table } = explicit.kind() {
                let evicted = uow.evict_table(table);
                log_debug!("{}: evicted {} managed {} row(s)", plan.name, evicted, table);
            }
        }
        Ok(affected)
    }

    fn projection_plan<R: ConstructorProjection>(&self, method: &str) -> AppResult<std::sync::Arc<QueryPlan>> {
        let plan = self.plan(method)?;
        match plan.shape {
            ResultShape::Constructor { type_id, .. } if type_id == TypeId::of::<R>() => Ok(plan),
            _ => Err(wrong_shape(&plan, R::NAME)),
        }
    }

    fn projection_content<R: ConstructorProjection>(
        &self,
        plan: &QueryPlan,
        args: &Args,
        sort: &Sort,
        window: Window,
    ) -> AppResult<BoundQuery> {
        let explicit = self.explicit_of(plan)?;
        let sortable = |property: &str| {
            R::FIELDS
                .iter()
                .find(|field| **field == property)
                .map(|field| field.to_string())
        };
        explicit_statement(plan, explicit, args, &sortable, sort, window)
    }

    /// Constructor-style rows of an explicit query.
    pub fn rows<R: ConstructorProjection>(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<Vec<R>> {
        let plan = self.projection_plan::<R>(method)?;
        let content = self.projection_content::<R>(&plan, &args, &Sort::unsorted(), Window::default())?;
        uow.query_rows::<R>(&content)
    }

    pub fn rows_page<R: ConstructorProjection>(
        &self,
        uow: &mut UnitOfWork<'_>,
        method: &str,
        args: Args,
        request: &PageRequest,
    ) -> AppResult<Page<R>> {
        let plan = self.projection_plan::<R>(method)?;
        let window = Window::range(request.offset(), request.size() as u64);
        let content = self.projection_content::<R>(&plan, &args, request.sort(), window)?;
        let rows = uow.query_rows::<R>(&content)?;
        let total = request.resolve_total(rows.len(), || {
            let statement = explicit_count(&plan, self.explicit_of(&plan)?, &args)?;
            Ok(first_count(uow.query_rows::<CountRow>(&statement)?))
        })?;
        Ok(Page::new(rows, request, total))
    }

    /// Views of a derived query, shaped by `V`'s declared accessors.
    pub fn views<V: View>(&self, uow: &mut UnitOfWork<'_>, method: &str, args: Args) -> AppResult<Vec<V>> {
        let view_plan = self.view_plan::<V>(method)?;
        let plan = self.entity_plan(method)?;
        let derived = plan.derived().ok_or_else(|| wrong_shape(&plan, view_plan.view()))?;
        let content = derived_statement(
            &plan,
            derived,
            E::meta(),
            &args,
            Selection::View(&view_plan),
            &Sort::unsorted(),
            Window::default(),
        )?;
        view_plan.load::<V>(uow, &content)
    }
}

fn specification_statement<E: Entity>(
    name: &str,
    spec: &Specification<E>,
    selection: Selection<'_>,
    sort: &Sort,
    window: Window,
) -> AppResult<BoundQuery> {
    let meta = E::meta();
    let mut builder = SelectBuilder::new(name, meta);
    let select_list = match selection {
        Selection::Count => "COUNT(*) AS count".to_string(),
        _ => meta.select_columns(ROOT_ALIAS),
    };
    let predicate = spec.predicate();
    let where_clause = if predicate.is_always() {
        String::new()
    } else {
        format!(" WHERE {}", predicate.render(&mut builder, JoinKind::Inner)?)
    };
    let order = builder.order_clause(sort)?;
    let window_sql = builder.window_clause(window);
    let sql = format!(
        "SELECT {} FROM {}{}{}{}",
        select_list,
        builder.from_clause(),
        where_clause,
        order,
        window_sql
    );
    Ok(builder.finish(sql))
}

/// Entities matching `spec`. Relations on the path of a leaf are inner-joined.
pub fn find_matching<E: Entity>(
    uow: &mut UnitOfWork<'_>,
    spec: &Specification<E>,
    sort: &Sort,
    window: Window,
) -> AppResult<Vec<Managed<E>>> {
    let name = format!("{}.findAll", E::meta().name);
    let content = specification_statement(&name, spec, Selection::Entities, sort, window)?;
    uow.query_entities::<E>(&content, false)
}

pub fn count_matching<E: Entity>(uow: &mut UnitOfWork<'_>, spec: &Specification<E>) -> AppResult<u64> {
    let name = format!("{}.count", E::meta().name);
    let statement = specification_statement(&name, spec, Selection::Count, &Sort::unsorted(), Window::default())?;
    Ok(first_count(uow.query_rows::<CountRow>(&statement)?))
}

pub fn find_page_matching<E: Entity>(
    uow: &mut UnitOfWork<'_>,
    spec: &Specification<E>,
    request: &PageRequest,
) -> AppResult<Page<Managed<E>>> {
    let window = Window::range(request.offset(), request.size() as u64);
    let content = find_matching(uow, spec, request.sort(), window)?;
    let total = request.resolve_total(content.len(), || count_matching(uow, spec))?;
    Ok(Page::new(content, request, total))
}

/// One-off SQL returning entity rows, parsed and bound per call.
pub fn native_query<E: Entity>(
    uow: &mut UnitOfWork<'_>,
    name: &str,
    sql: &str,
    args: &Args,
) -> AppResult<Vec<Managed<E>>> {
    let query = ExplicitQuery::parse(name, sql)?;
    if query.is_modifying() {
        return Err(AppError::InvalidInput(format!("`{}` must be a select", name)));
    }
    let bound = query.bind(name, args, true)?;
    uow.query_entities::<E>(&bound, false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::member::domain::entities::Member;
    use crate::shared::application::pagination::Order;
    use crate::shared::query::plan::QueryDefinition;

    fn registry() -> QueryRegistry<Member> {
        let registry = QueryRegistry::new();
        for method in [
            "findByUsernameAndAgeGreaterThan",
            "findTop3By",
            "findDistinctByTeamName",
            "countByAge",
        ] {
            registry.register(QueryDefinition::derived(method)).unwrap();
        }
        registry
            .register(QueryDefinition::explicit(
                "findUser",
                "SELECT m.* FROM member m WHERE m.username = :username AND m.age = :age",
            ))
            .unwrap();
        registry
    }

    fn args(values: Vec<Value>) -> Args {
        values.into_iter().fold(Args::new(), |args, value| args.arg(value))
    }

    #[test]
    fn derived_select_renders_where_order_and_window() {
        let registry = registry();
        let plan = registry.plan("findByUsernameAndAgeGreaterThan").unwrap();
        let statement = derived_statement(
            &plan,
            plan.derived().unwrap(),
            Member::meta(),
            &args(vec![Value::from("AAA"), Value::Int(5)]),
            Selection::Entities,
            &Sort::by(Order::desc("age")),
            Window::range(0, 10),
        )
        .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT t0.member_id AS member_id, t0.username AS username, t0.age AS age, t0.team_id AS team_id \
             FROM member t0 WHERE (t0.username = ?) AND (t0.age > ?) ORDER BY t0.age DESC LIMIT ? OFFSET ?"
        );
        assert_eq!(
            statement.binds,
            vec![Value::from("AAA"), Value::Int(5), Value::Int(10), Value::Int(0)]
        );
    }

    #[test]
    fn top_limits_cap_the_window() {
        assert_eq!(capped(Window::default(), Some(3)).limit, Some(3));
        assert_eq!(capped(Window::range(0, 10), Some(3)).limit, Some(3));
        assert_eq!(capped(Window::range(0, 2), Some(3)).limit, Some(2));
        assert_eq!(capped(Window::range(4, 2), None), Window::range(4, 2));
    }

    #[test]
    fn top_limits_bound_later_windows() {
        assert_eq!(capped(Window::range(2, 2), Some(3)), Window::range(2, 1));
        assert_eq!(capped(Window::range(2, 3), Some(3)), Window::range(2, 1));
        assert_eq!(capped(Window::range(4, 2), Some(3)).limit, Some(0));
        assert_eq!(
            capped(Window { offset: 1, limit: None }, Some(3)),
            Window::range(1, 2)
        );
    }

    #[test]
    fn distinct_counts_count_distinct_ids() {
        let registry = registry();
        let plan = registry.plan("findDistinctByTeamName").unwrap();
        let statement = derived_statement(
            &plan,
            plan.derived().unwrap(),
            Member::meta(),
            &args(vec![Value::from("teamA")]),
            Selection::Count,
            &Sort::unsorted(),
            Window::default(),
        )
        .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT COUNT(DISTINCT t0.member_id) AS count FROM member t0 \
             LEFT JOIN team t1 ON t1.team_id = t0.team_id WHERE t1.name = ?"
        );
    }

    #[test]
    fn derived_queries_reject_named_arguments() {
        let registry = registry();
        let plan = registry.plan("countByAge").unwrap();
        let err = derived_statement(
            &plan,
            plan.derived().unwrap(),
            Member::meta(),
            &Args::new().bind("age", 10),
            Selection::Count,
            &Sort::unsorted(),
            Window::default(),
        )
        .unwrap_err();
        assert!(matches!(err, AppError::ParameterBinding(_)));
    }

    #[test]
    fn explicit_queries_are_wrapped_for_paging() {
        let registry = registry();
        let plan = registry.plan("findUser").unwrap();
        let sortable = |property: &str| Member::meta().attribute(property).map(|a| a.column.to_string());
        let statement = explicit_statement(
            &plan,
            plan.explicit().unwrap(),
            &Args::new().bind("username", "AAA").bind("age", 10),
            &sortable,
            &Sort::desc("username"),
            Window::range(3, 3),
        )
        .unwrap();
        assert_eq!(
            statement.sql,
            "SELECT * FROM (SELECT m.* FROM member m WHERE m.username = ? AND m.age = ?) AS q \
             ORDER BY q.username DESC LIMIT ? OFFSET ?"
        );

        let count = explicit_count(
            &plan,
            plan.explicit().unwrap(),
            &Args::new().bind("username", "AAA").bind("age", 10),
        )
        .unwrap();
        assert!(count.sql.starts_with("SELECT COUNT(*) AS count FROM (SELECT m.*"));
    }
}
