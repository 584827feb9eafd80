//! Batched eager loading
//!
//! After a primary query, nested filters with `subqueryload` set ask for their
//! relation to be loaded. The resolver collects the distinct foreign-key values
//! of every owner, calls the relation's registered loader once per batch of
//! [`BATCH_SIZE`] ids, and attaches each loaded row to every owner slot whose
//! key matches the row's mapper column.
//!
//! Loaded rows are resolved themselves (when their filter asks for more) before
//! they are attached, which lets self-referential trees load level by level.
//! The work is kept on an explicit list of frames rather than the call stack.

use once_cell::sync::Lazy;
use sea_query::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use crate::error::OrmError;
use crate::filter::{Filter, FilterField};
use crate::model::Model;
use crate::registry::Seal;
use crate::schema::{self, Table};
use crate::session::Session;
use crate::value::{is_zero, KeyValue};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;

/// Largest id list handed to a loader in one call.
pub const BATCH_SIZE: usize = 1000;

/// Rows returned by a relation loader
pub enum LoadedRows {
    One(Box<dyn Model>),
    Many(Vec<Box<dyn Model>>),
}

impl LoadedRows {
    pub fn one<M: Model>(row: M) -> Self {
        LoadedRows::One(Box::new(row))
    }

    pub fn many<M: Model>(rows: Vec<M>) -> Self {
        LoadedRows::Many(
            rows.into_iter()
                .map(|row| Box::new(row) as Box<dyn Model>)
                .collect(),
        )
    }

    pub fn none() -> Self {
        LoadedRows::Many(Vec::new())
    }

    fn into_rows(self) -> Result<Vec<Box<dyn Model>>, OrmError> {
        let rows = match self {
            LoadedRows::One(row) => vec![row],
            LoadedRows::Many(rows) => rows,
        };
        if let Some(first) = rows.first() {
            let expected = (**first).model_type();
            if let Some(other) = rows.iter().find(|row| (***row).model_type() != expected) {
                return Err(OrmError::LoaderShape(format!(
                    "loader returned both {} and {}",
                    (**first).model_name(),
                    (**other).model_name()
                )));
            }
        }
        Ok(rows)
    }
}

/// Loader callback: `(session, batch of key values) -> rows`
pub type LoaderFn = Arc<dyn Fn(&Session, &[Value]) -> Result<LoadedRows, OrmError> + Send + Sync>;

/// A registered relation loader
pub struct Loader {
    mapper: String,
    load: LoaderFn,
}

impl Loader {
    /// Column on loaded rows holding the key back to the owner.
    pub fn mapper(&self) -> &str {
        &self.mapper
    }

    /// # Errors
    ///
    /// Whatever the loader returns.
    pub fn load(&self, session: &Session, ids: &[Value]) -> Result<LoadedRows, OrmError> {
        (self.load)(session, ids)
    }
}

/// Process-wide relation loader registry
#[derive(Default)]
pub struct LoaderRegistry {
    loaders: RwLock<HashMap<String, Arc<Loader>>>,
    seal: Seal,
}

static LOADERS: Lazy<LoaderRegistry> = Lazy::new(LoaderRegistry::default);

pub fn loaders() -> &'static LoaderRegistry {
    &LOADERS
}

impl LoaderRegistry {
    pub fn seal(&self) {
        self.seal.seal();
    }

    /// # Errors
    ///
    /// Returns `OrmError::RegistrySealed` naming `what` after sealing.
    pub fn check_open(&self, what: &str) -> Result<(), OrmError> {
        self.seal.check(what)
    }

    /// Register (or replace) the loader under `key`
    ///
    /// # Errors
    ///
    /// Returns `OrmError::RegistrySealed` after sealing.
    pub fn insert(&self, key: String, mapper: &str, load: LoaderFn) -> Result<(), OrmError> {
        self.seal.check(&key)?;
        let mut loaders = self
            .loaders
            .write()
            .map_err(|e| OrmError::Configuration(format!("Failed to lock loader registry: {e}")))?;
        log::info!("registered subquery loader {key}");
        loaders.insert(
            key,
            Arc::new(Loader {
                mapper: mapper.to_string(),
                load,
            }),
        );
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `OrmError::Configuration` when no loader is registered under `key`.
    pub fn get(&self, key: &str) -> Result<Arc<Loader>, OrmError> {
        let loaders = self
            .loaders
            .read()
            .map_err(|e| OrmError::Configuration(format!("Failed to lock loader registry: {e}")))?;
        loaders.get(key).cloned().ok_or_else(|| {
            OrmError::Configuration(format!("No subquery loader registered for {key}"))
        })
    }
}

enum Rows<'a> {
    Borrowed(Vec<&'a mut dyn Model>),
    Owned(Vec<Box<dyn Model>>),
}

impl Rows<'_> {
    fn len(&self) -> usize {
        match self {
            Rows::Borrowed(rows) => rows.len(),
            Rows::Owned(rows) => rows.len(),
        }
    }

    fn get(&self, index: usize) -> &dyn Model {
        match self {
            Rows::Borrowed(rows) => &*rows[index],
            Rows::Owned(rows) => &*rows[index],
        }
    }

    fn get_mut(&mut self, index: usize) -> &mut dyn Model {
        match self {
            Rows::Borrowed(rows) => &mut *rows[index],
            Rows::Owned(rows) => &mut *rows[index],
        }
    }
}

/// Owner slots waiting for rows, keyed by the owner's foreign-key value
type Slots = HashMap<KeyValue, Vec<(usize, usize)>>;

/// Where a frame's rows go once they are resolved
struct Link {
    parent: usize,
    mapper_index: usize,
    slots: Slots,
}

struct Frame<'a> {
    table: Arc<Table>,
    filter: &'a dyn Filter,
    rows: Rows<'a>,
    link: Option<Link>,
}

struct Request<'a> {
    key: String,
    filter: &'a dyn Filter,
    ids: Vec<Value>,
    seen: HashSet<KeyValue>,
    slots: Slots,
}

/// Load every relation `filter` asks for onto `owners`
///
/// # Errors
///
/// Returns `OrmError::Configuration` for missing loaders or relation fields,
/// `OrmError::LoaderShape` for mixed loader results, and any loader failure.
/// Rows attached before a failure stay attached.
pub fn resolve<M: Model>(
    session: &Session,
    table: Arc<Table>,
    owners: &mut [M],
    filter: &dyn Filter,
) -> Result<(), OrmError> {
    let rows = owners.iter_mut().map(|m| m as &mut dyn Model).collect();
    let mut frames = vec![Frame {
        table,
        filter,
        rows: Rows::Borrowed(rows),
        link: None,
    }];

    let mut current = 0;
    while current < frames.len() {
        let requests = collect_requests(&frames[current])?;
        for request in requests {
            if let Some(frame) = load_request(session, current, request)? {
                frames.push(frame);
            }
        }
        current += 1;
    }

    // Children always sit after their parent, so popping attaches the deepest
    // level first and every row is complete before it is shared.
    while let Some(Frame { rows, link, .. }) = frames.pop() {
        let (Some(link), Rows::Owned(rows)) = (link, rows) else {
            continue;
        };
        let parent = frames.get_mut(link.parent).ok_or_else(|| {
            OrmError::Configuration("eager frame lost its parent".to_string())
        })?;
        stitch(parent, &link, rows)?;
    }
    Ok(())
}

fn collect_requests<'a>(frame: &Frame<'a>) -> Result<Vec<Request<'a>>, OrmError> {
    let filter: &'a dyn Filter = frame.filter;
    let mut requests: Vec<Request<'a>> = Vec::new();

    for field in filter.fields() {
        let FilterField::Nested { name, filters, .. } = field else {
            continue;
        };
        let Some(child) = filters.into_iter().find(|f| f.options().subqueryload) else {
            continue;
        };
        let relation = frame.table.relation(name).ok_or_else(|| {
            OrmError::Configuration(format!(
                "Model {} has no relation field {name}",
                frame.table.model_name()
            ))
        })?;
        let owner_index = frame
            .table
            .field_index(relation.relation.owner_column)
            .ok_or_else(|| {
                OrmError::Configuration(format!(
                    "Cannot find column {} on table {}",
                    relation.relation.owner_column,
                    frame.table.name()
                ))
            })?;

        // Relations sharing a loader share one request unless either side
        // loads further levels, which need their own frame and filter.
        let key = relation.relation.loader_key();
        let mergeable = !requests_eager(child);
        let position = match requests
            .iter()
            .position(|r| mergeable && r.key == key && !requests_eager(r.filter))
        {
            Some(position) => position,
            None => {
                requests.push(Request {
                    key,
                    filter: child,
                    ids: Vec::new(),
                    seen: HashSet::new(),
                    slots: HashMap::new(),
                });
                requests.len() - 1
            }
        };
        let request = &mut requests[position];

        for owner in 0..frame.rows.len() {
            let value = frame.rows.get(owner).value(owner_index);
            if is_zero(&value) {
                continue;
            }
            let key_value = KeyValue::from_value(&value);
            if request.seen.insert(key_value.clone()) {
                request.ids.push(value);
            }
            request
                .slots
                .entry(key_value)
                .or_default()
                .push((owner, relation.field_index));
        }
    }
    Ok(requests)
}

fn requests_eager(filter: &dyn Filter) -> bool {
    filter.fields().into_iter().any(|field| match field {
        FilterField::Nested { filters, .. } => filters.iter().any(|f| f.options().subqueryload),
        FilterField::Value { .. } => false,
    })
}

fn load_request<'a>(
    session: &Session,
    parent: usize,
    request: Request<'a>,
) -> Result<Option<Frame<'a>>, OrmError> {
    let loader = loaders().get(&request.key)?;
    if request.ids.is_empty() {
        return Ok(None);
    }

    let mut rows: Vec<Box<dyn Model>> = Vec::new();
    for batch in request.ids.chunks(BATCH_SIZE) {
        session.context().check()?;

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::eager_load_span(&request.key, batch.len()).entered();
        #[cfg(feature = "metrics")]
        METRICS.record_eager_batch();

        log::debug!("subquery loading {} ids for {}", batch.len(), request.key);
        rows.extend(loader.load(session, batch)?.into_rows()?);
    }

    let Some(first) = rows.first() else {
        return Ok(None);
    };
    let first: &dyn Model = &**first;
    let table = schema::registry().get_by_model_type(first.model_type(), first.model_name())?;
    let mapper_index = table.field_index(loader.mapper()).ok_or_else(|| {
        OrmError::Configuration(format!(
            "Cannot find mapper column {} on table {}",
            loader.mapper(),
            table.name()
        ))
    })?;

    Ok(Some(Frame {
        table,
        filter: request.filter,
        rows: Rows::Owned(rows),
        link: Some(Link {
            parent,
            mapper_index,
            slots: request.slots,
        }),
    }))
}

fn stitch(parent: &mut Frame<'_>, link: &Link, rows: Vec<Box<dyn Model>>) -> Result<(), OrmError> {
    for row in rows {
        let key = KeyValue::from_value(&row.value(link.mapper_index));
        let Some(slots) = link.slots.get(&key) else {
            continue;
        };
        let shared = row.into_shared();
        for &(owner, field) in slots {
            let slot = parent
                .rows
                .get_mut(owner)
                .relation_mut(field)
                .ok_or_else(|| {
                    OrmError::Configuration(format!(
                        "Field {field} of {} is not a relation slot",
                        parent.table.model_name()
                    ))
                })?;
            slot.attach(Arc::clone(&shared))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_cfg::{
        self, Category, CategoryFilter, Node, NodeFilter, Post, PostFilter, RecordingExecutor,
    };
    use crate::model::{FieldDef, HasMany, Relation, RelationSlot};

    #[test]
    fn test_loader_shape_rejects_mixed_rows() {
        let rows = LoadedRows::Many(vec![
            Box::new(Category::default()) as Box<dyn Model>,
            Box::new(Post::default()) as Box<dyn Model>,
        ]);
        let err = rows.into_rows().unwrap_err();
        assert!(matches!(err, OrmError::LoaderShape(_)));
    }

    #[test]
    fn test_single_row_is_accepted() {
        let rows = LoadedRows::one(Category::default()).into_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert!(LoadedRows::none().into_rows().unwrap().is_empty());
    }

    #[test]
    fn test_missing_loader_is_configuration_error() {
        let err = loaders().get("no_such_table_per_x").err().unwrap();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_two_distinct_keys_issue_one_batch() {
        tests_cfg::register_fixtures();
        let (recorder, session) = tests_cfg::session();
        recorder.push_response(vec![
            tests_cfg::category_record(1, "news"),
            tests_cfg::category_record(2, "tech"),
        ]);
        let mut posts = vec![
            Post::new(1, 1),
            Post::new(2, 2),
            Post::new(3, 1),
            Post::new(4, 0),
        ];
        let filter = PostFilter::default().with_category(CategoryFilter::default().subqueryload());
        let table = schema::registry().get_by_model::<Post>().unwrap();
        resolve(&session, table, &mut posts, &filter).unwrap();

        assert_eq!(recorder.statements().len(), 1);
        assert_eq!(recorder.param_counts(), vec![2]);
        assert_eq!(posts[0].category.get().map(|c| c.name.as_str()), Some("news"));
        assert_eq!(posts[1].category.get().map(|c| c.name.as_str()), Some("tech"));
        assert_eq!(posts[2].category.get().map(|c| c.id), Some(1));
        assert!(!posts[3].category.is_loaded());
    }

    #[test]
    fn test_large_id_sets_are_batched() {
        tests_cfg::register_fixtures();
        let (recorder, session) = tests_cfg::session();
        let mut posts: Vec<Post> = (1..=2500).map(|i| Post::new(i, i)).collect();
        let filter = PostFilter::default().with_category(CategoryFilter::default().subqueryload());
        let table = schema::registry().get_by_model::<Post>().unwrap();
        resolve(&session, table, &mut posts, &filter).unwrap();
        assert_eq!(recorder.param_counts(), vec![1000, 1000, 500]);
    }

    #[test]
    fn test_no_eager_intent_issues_nothing() {
        tests_cfg::register_fixtures();
        let (recorder, session) = tests_cfg::session();
        let mut posts = vec![Post::new(1, 1)];
        let filter = PostFilter::default().with_category(CategoryFilter::default());
        let table = schema::registry().get_by_model::<Post>().unwrap();
        resolve(&session, table, &mut posts, &filter).unwrap();
        assert!(recorder.statements().is_empty());
    }

    #[test]
    fn test_recursive_tree_resolves_every_level() {
        tests_cfg::register_fixtures();
        let (recorder, session) = tests_cfg::session();
        // level 1: children of 1; level 2: children of 2 and 3; level 3 not requested
        recorder.push_response(vec![
            tests_cfg::node_record(2, 1),
            tests_cfg::node_record(3, 1),
        ]);
        recorder.push_response(vec![tests_cfg::node_record(4, 2)]);

        let mut roots = vec![Node::new(1, 0)];
        let filter = NodeFilter::default()
            .with_children(NodeFilter::default().subqueryload().with_children(
                NodeFilter::default().subqueryload().with_children(NodeFilter::default()),
            ));
        let table = schema::registry().get_by_model::<Node>().unwrap();
        resolve(&session, table, &mut roots, &filter).unwrap();

        assert_eq!(recorder.statements().len(), 2);
        let children: Vec<&Node> = roots[0].children.iter().collect();
        assert_eq!(children.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 3]);
        let grandchildren: Vec<i64> = children[0].children.iter().map(|n| n.id).collect();
        assert_eq!(grandchildren, vec![4]);
        assert!(children[1].children.is_empty());
    }

    #[test]
    fn test_cancelled_context_stops_batches() {
        tests_cfg::register_fixtures();
        let (recorder, session) = tests_cfg::session();
        session.context().cancel();
        let mut posts = vec![Post::new(1, 1)];
        let filter = PostFilter::default().with_category(CategoryFilter::default().subqueryload());
        let table = schema::registry().get_by_model::<Post>().unwrap();
        let err = resolve(&session, table, &mut posts, &filter).unwrap_err();
        assert!(matches!(err, OrmError::Cancelled));
        assert!(recorder.statements().is_empty());
    }

    /// Two relations served by the same loader
    #[derive(Debug, Default, Clone)]
    struct Grove {
        id: i64,
        left: HasMany<Node>,
        right: HasMany<Node>,
    }

    impl Model for Grove {
        fn fields() -> Vec<FieldDef> {
            vec![
                FieldDef::column("id"),
                FieldDef::relation("left", Relation::reverse("node", "id", "parent_id")),
                FieldDef::relation("right", Relation::reverse("node", "id", "parent_id")),
            ]
        }

        fn value(&self, _index: usize) -> Value {
            self.id.into()
        }

        fn set_value(&mut self, _index: usize, value: Value) -> Result<(), OrmError> {
            self.id = crate::value::convert(value, "id")?;
            Ok(())
        }

        fn relation_mut(&mut self, index: usize) -> Option<&mut dyn RelationSlot> {
            match index {
                1 => Some(&mut self.left),
                2 => Some(&mut self.right),
                _ => None,
            }
        }
    }

    #[derive(Default)]
    struct GroveFilter {
        options: crate::filter::FilterOptions,
        left: Option<NodeFilter>,
        right: Option<NodeFilter>,
    }

    impl Filter for GroveFilter {
        fn options(&self) -> &crate::filter::FilterOptions {
            &self.options
        }

        fn fields(&self) -> Vec<FilterField<'_>> {
            vec![
                FilterField::eager("left", self.left.as_ref()),
                FilterField::eager("right", self.right.as_ref()),
            ]
        }
    }

    fn grove_table() -> Arc<Table> {
        schema::SchemaRegistry::new()
            .table::<Grove>("test", "grove")
            .register()
            .unwrap()
    }

    #[test]
    fn test_shared_loader_keeps_deeper_intent_of_each_relation() {
        tests_cfg::register_fixtures();
        let (recorder, session) = tests_cfg::session();
        recorder.push_response(vec![tests_cfg::node_record(2, 1)]);
        recorder.push_response(vec![tests_cfg::node_record(2, 1)]);
        recorder.push_response(vec![tests_cfg::node_record(3, 2)]);

        let mut groves = vec![Grove {
            id: 1,
            ..Grove::default()
        }];
        let filter = GroveFilter {
            left: Some(NodeFilter::default().subqueryload()),
            right: Some(
                NodeFilter::default()
                    .subqueryload()
                    .with_children(NodeFilter::default().subqueryload()),
            ),
            ..GroveFilter::default()
        };
        resolve(&session, grove_table(), &mut groves, &filter).unwrap();

        assert_eq!(recorder.statements().len(), 3);
        let left: Vec<&Node> = groves[0].left.iter().collect();
        let right: Vec<&Node> = groves[0].right.iter().collect();
        assert_eq!((left.len(), right.len()), (1, 1));
        assert!(left[0].children.is_empty());
        assert_eq!(right[0].children.iter().map(|n| n.id).collect::<Vec<_>>(), vec![3]);
    }

    #[test]
    fn test_shared_loader_merges_flat_relations() {
        tests_cfg::register_fixtures();
        let (recorder, session) = tests_cfg::session();
        recorder.push_response(vec![tests_cfg::node_record(2, 1)]);

        let mut groves = vec![Grove {
            id: 1,
            ..Grove::default()
        }];
        let filter = GroveFilter {
            left: Some(NodeFilter::default().subqueryload()),
            right: Some(NodeFilter::default().subqueryload()),
            ..GroveFilter::default()
        };
        resolve(&session, grove_table(), &mut groves, &filter).unwrap();

        assert_eq!(recorder.statements().len(), 1);
        assert_eq!(groves[0].left.iter().count(), 1);
        assert_eq!(groves[0].right.iter().count(), 1);
    }

    #[derive(Default)]
    struct StrayFilter {
        options: crate::filter::FilterOptions,
        stray: Option<CategoryFilter>,
    }

    impl Filter for StrayFilter {
        fn options(&self) -> &crate::filter::FilterOptions {
            &self.options
        }

        fn fields(&self) -> Vec<FilterField<'_>> {
            vec![FilterField::eager("stray", self.stray.as_ref())]
        }
    }

    #[test]
    fn test_eager_field_without_relation_is_rejected() {
        tests_cfg::register_fixtures();
        let (_recorder, session) = tests_cfg::session();
        let mut categories = vec![Category::default()];
        let filter = StrayFilter {
            stray: Some(CategoryFilter::default().subqueryload()),
            ..StrayFilter::default()
        };
        let table = schema::registry().get_by_model::<Category>().unwrap();
        let err = resolve(&session, table, &mut categories, &filter).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("stray"));
    }
}
