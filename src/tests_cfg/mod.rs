//! Test fixtures
//!
//! A recording executor and hook, plus a small blog schema (categories, posts,
//! post metadata, tags, post/tag links) and a self-referential node tree,
//! registered once in the process-wide registries under [`DB`].

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use may_postgres::types::ToSql;
use sea_query::{Value, Values};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Once};

use crate::crud;
use crate::database::Database;
use crate::dialect::DatabaseSystem;
use crate::eager::LoadedRows;
use crate::error::OrmError;
use crate::executor::Executor;
use crate::filter::{
    in_list, Direction, Filter, FilterField, FilterOptions, JoinSpec, RequestOption, TypedFilter,
    ValueFilter,
};
use crate::hook::ExecutorHook;
use crate::model::{FieldDef, HasMany, HasOne, Model, Relation, RelationSlot};
use crate::record::Record;
use crate::schema;
use crate::session::{Context, Session};
use crate::value::convert;

pub const DB: &str = "test";

/// Executor that records statements and replays queued responses
///
/// `query` pops the next queued row set (empty when none is queued);
/// `execute` pops the next queued affected count (1 when none is queued).
#[derive(Default)]
pub struct RecordingExecutor {
    statements: Mutex<Vec<(String, usize)>>,
    responses: Mutex<VecDeque<Vec<Record>>>,
    affected: Mutex<VecDeque<u64>>,
    failure: Mutex<Option<String>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statements(&self) -> Vec<String> {
        self.statements.lock().unwrap().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub fn param_counts(&self) -> Vec<usize> {
        self.statements.lock().unwrap().iter().map(|(_, n)| *n).collect()
    }

    pub fn push_response(&self, rows: Vec<Record>) {
        self.responses.lock().unwrap().push_back(rows);
    }

    pub fn push_affected(&self, rows: u64) {
        self.affected.lock().unwrap().push_back(rows);
    }

    /// Fail the next statement with `OrmError::Query(message)`.
    pub fn fail_next(&self, message: &str) {
        *self.failure.lock().unwrap() = Some(message.to_string());
    }

    fn record(&self, query: &str, params: &[&dyn ToSql]) -> Result<(), OrmError> {
        self.statements
            .lock()
            .unwrap()
            .push((query.to_string(), params.len()));
        match self.failure.lock().unwrap().take() {
            Some(message) => Err(OrmError::Query(message)),
            None => Ok(()),
        }
    }
}

impl Executor for RecordingExecutor {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, OrmError> {
        self.record(query, params)?;
        Ok(self.affected.lock().unwrap().pop_front().unwrap_or(1))
    }

    fn query(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Record>, OrmError> {
        self.record(query, params)?;
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// Hook that records `(callback, sql, parameter count)` for every call
#[derive(Default)]
pub struct RecordingHook {
    events: Mutex<Vec<(String, String, usize)>>,
}

impl RecordingHook {
    pub fn events(&self) -> Vec<(String, String, usize)> {
        self.events.lock().unwrap().clone()
    }

    fn push(&self, kind: &str, query: &str, args: &Values) {
        self.events
            .lock()
            .unwrap()
            .push((kind.to_string(), query.to_string(), args.0.len()));
    }
}

macro_rules! recording_callbacks {
    ($($name:ident),* $(,)?) => {
        impl ExecutorHook for RecordingHook {
            $(
                fn $name(&self, _ctx: &Context, query: &str, args: &Values) {
                    self.push(stringify!($name), query, args);
                }
            )*
        }
    };
}

recording_callbacks!(
    before_select_one,
    after_select_one,
    before_select,
    after_select,
    before_insert,
    after_insert,
    before_update,
    after_update,
    before_delete,
    after_delete,
    before_exec,
    after_exec,
);

pub fn session_on(system: DatabaseSystem) -> (Arc<RecordingExecutor>, Session) {
    let recorder = Arc::new(RecordingExecutor::new());
    let database = Database::new(DB, system, recorder.clone());
    let session = Session::with_database(Arc::new(database), Context::background()).unwrap();
    (recorder, session)
}

/// A Postgres session over a fresh recorder.
pub fn session() -> (Arc<RecordingExecutor>, Session) {
    session_on(DatabaseSystem::Postgres)
}

/// Builder methods shared by every fixture filter
macro_rules! filter_options {
    ($($filter:ident),* $(,)?) => {
        $(
            impl $filter {
                pub fn subqueryload(mut self) -> Self {
                    self.options.allow_subqueryload();
                    self
                }

                pub fn distinct(mut self) -> Self {
                    self.options.add_option(RequestOption::SelectDistinct);
                    self
                }

                pub fn for_update(mut self) -> Self {
                    self.options.add_option(RequestOption::SelectForUpdate);
                    self
                }

                pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
                    self.options.order_by(column, direction);
                    self
                }

                pub fn limit(mut self, limit: u64) -> Self {
                    self.options.set_limit(limit);
                    self
                }

                pub fn offset(mut self, offset: u64) -> Self {
                    self.options.set_offset(offset);
                    self
                }

                pub fn load_columns(mut self, columns: &[&str]) -> Self {
                    self.options.load_columns(columns);
                    self
                }

                pub fn dont_load_columns(mut self, columns: &[&str]) -> Self {
                    self.options.dont_load_columns(columns);
                    self
                }
            }
        )*
    };
}

filter_options!(
    CategoryFilter,
    PostFilter,
    PostMetadataFilter,
    TagFilter,
    PostTagFilter,
    NodeFilter,
);

// category

#[derive(Debug, Default, Clone)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model for Category {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::column("id"),
            FieldDef::column("name"),
            FieldDef::column("created_at"),
            FieldDef::column("updated_at"),
        ]
    }

    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.id.into(),
            1 => self.name.clone().into(),
            2 => self.created_at.into(),
            _ => self.updated_at.into(),
        }
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        match index {
            0 => self.id = convert(value, "id")?,
            1 => self.name = convert(value, "name")?,
            2 => self.created_at = convert(value, "created_at")?,
            _ => self.updated_at = convert(value, "updated_at")?,
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct CategoryFilter {
    options: FilterOptions,
    id: Option<ValueFilter>,
    name: Option<ValueFilter>,
}

impl CategoryFilter {
    pub fn with_id(mut self, filter: ValueFilter) -> Self {
        self.id = Some(filter);
        self
    }

    pub fn with_name(mut self, filter: ValueFilter) -> Self {
        self.name = Some(filter);
        self
    }
}

impl Filter for CategoryFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        vec![
            FilterField::value("id", &self.id),
            FilterField::value("name", &self.name),
        ]
    }
}

impl TypedFilter for CategoryFilter {
    type Model = Category;
}

pub fn category_record(id: i64, name: &str) -> Record {
    Record::new().with("id", id).with("name", name)
}

// post

#[derive(Debug, Default, Clone)]
pub struct Post {
    pub id: i64,
    pub subject: String,
    pub category_id: i64,
    pub parent_post_id: i64,
    pub category: HasOne<Category>,
    pub metadata: HasMany<PostMetadata>,
}

impl Post {
    pub fn new(id: i64, category_id: i64) -> Self {
        Self {
            id,
            subject: format!("post {id}"),
            category_id,
            ..Self::default()
        }
    }
}

impl Model for Post {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::column("id"),
            FieldDef::column("subject"),
            FieldDef::column("category_id"),
            FieldDef::column("parent_post_id"),
            FieldDef::relation("category", Relation::to("category", "category_id")),
            FieldDef::relation("metadata", Relation::reverse("post_metadata", "id", "post_id")),
        ]
    }

    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.id.into(),
            1 => self.subject.clone().into(),
            2 => self.category_id.into(),
            _ => self.parent_post_id.into(),
        }
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        match index {
            0 => self.id = convert(value, "id")?,
            1 => self.subject = convert(value, "subject")?,
            2 => self.category_id = convert(value, "category_id")?,
            _ => self.parent_post_id = convert(value, "parent_post_id")?,
        }
        Ok(())
    }

    fn relation_mut(&mut self, index: usize) -> Option<&mut dyn RelationSlot> {
        match index {
            4 => Some(&mut self.category),
            5 => Some(&mut self.metadata),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct PostFilter {
    options: FilterOptions,
    id: Option<ValueFilter>,
    subject: Option<ValueFilter>,
    category_id: Option<ValueFilter>,
    category: Option<CategoryFilter>,
    metadata: Vec<PostMetadataFilter>,
}

impl PostFilter {
    pub fn with_id(mut self, filter: ValueFilter) -> Self {
        self.id = Some(filter);
        self
    }

    pub fn with_subject(mut self, filter: ValueFilter) -> Self {
        self.subject = Some(filter);
        self
    }

    pub fn with_category(mut self, filter: CategoryFilter) -> Self {
        self.category = Some(filter);
        self
    }

    pub fn with_metadata(mut self, filters: Vec<PostMetadataFilter>) -> Self {
        self.metadata = filters;
        self
    }
}

impl Filter for PostFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        vec![
            FilterField::value("id", &self.id),
            FilterField::value("subject", &self.subject),
            FilterField::value("category_id", &self.category_id),
            FilterField::join(
                "category",
                JoinSpec::inner("id", "category_id"),
                self.category.as_ref(),
            ),
            FilterField::join_many("metadata", JoinSpec::inner("post_id", "id"), &self.metadata),
        ]
    }
}

impl TypedFilter for PostFilter {
    type Model = Post;
}

pub fn post_record(id: i64, category_id: i64) -> Record {
    Record::new()
        .with("id", id)
        .with("subject", format!("post {id}"))
        .with("category_id", category_id)
        .with("parent_post_id", 0i64)
}

// post_metadata

#[derive(Debug, Default, Clone)]
pub struct PostMetadata {
    pub id: i64,
    pub post_id: i64,
    pub key: String,
    pub value: String,
}

impl Model for PostMetadata {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::column("id"),
            FieldDef::column("post_id"),
            FieldDef::column("key"),
            FieldDef::column("value"),
        ]
    }

    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.id.into(),
            1 => self.post_id.into(),
            2 => self.key.clone().into(),
            _ => self.value.clone().into(),
        }
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        match index {
            0 => self.id = convert(value, "id")?,
            1 => self.post_id = convert(value, "post_id")?,
            2 => self.key = convert(value, "key")?,
            _ => self.value = convert(value, "value")?,
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PostMetadataFilter {
    options: FilterOptions,
    post_id: Option<ValueFilter>,
    key: Option<ValueFilter>,
}

impl PostMetadataFilter {
    pub fn with_key(mut self, filter: ValueFilter) -> Self {
        self.key = Some(filter);
        self
    }
}

impl Filter for PostMetadataFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        vec![
            FilterField::value("post_id", &self.post_id),
            FilterField::value("key", &self.key),
        ]
    }
}

impl TypedFilter for PostMetadataFilter {
    type Model = PostMetadata;
}

// tag

#[derive(Debug, Default, Clone)]
pub struct Tag {
    pub id: i64,
    pub tag: String,
}

impl Tag {
    pub fn new(tag: &str) -> Self {
        Self {
            id: 0,
            tag: tag.to_string(),
        }
    }
}

impl Model for Tag {
    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::column("id"), FieldDef::column("tag")]
    }

    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.id.into(),
            _ => self.tag.clone().into(),
        }
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        match index {
            0 => self.id = convert(value, "id")?,
            _ => self.tag = convert(value, "tag")?,
        }
        Ok(())
    }

    fn before_insert(&mut self, _session: &Session) -> Result<(), OrmError> {
        if self.tag.is_empty() {
            return Err(OrmError::Configuration("a tag needs a label".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct TagFilter {
    options: FilterOptions,
    id: Option<ValueFilter>,
    tag: Option<ValueFilter>,
}

impl Filter for TagFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        vec![
            FilterField::value("id", &self.id),
            FilterField::value("tag", &self.tag),
        ]
    }
}

impl TypedFilter for TagFilter {
    type Model = Tag;
}

// post_tag: composite key, timestamps stamped by hooks

#[derive(Debug, Default, Clone)]
pub struct PostTag {
    pub post_id: i64,
    pub tag_id: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub note: String,
}

impl PostTag {
    pub fn new(post_id: i64, tag_id: i64) -> Self {
        Self {
            post_id,
            tag_id,
            ..Self::default()
        }
    }
}

impl Model for PostTag {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::column("post_id"),
            FieldDef::column("tag_id"),
            FieldDef::column("created_at"),
            FieldDef::column("updated_at"),
            FieldDef::excluded("note"),
        ]
    }

    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.post_id.into(),
            1 => self.tag_id.into(),
            2 => self.created_at.into(),
            _ => self.updated_at.into(),
        }
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        match index {
            0 => self.post_id = convert(value, "post_id")?,
            1 => self.tag_id = convert(value, "tag_id")?,
            2 => self.created_at = convert(value, "created_at")?,
            3 => self.updated_at = convert(value, "updated_at")?,
            _ => {}
        }
        Ok(())
    }

    fn before_insert(&mut self, _session: &Session) -> Result<(), OrmError> {
        let now = Utc::now();
        self.created_at = Some(now);
        self.updated_at = Some(now);
        Ok(())
    }

    fn before_update(&mut self, _session: &Session) -> Result<(), OrmError> {
        self.updated_at = Some(Utc::now());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct PostTagFilter {
    options: FilterOptions,
    post_id: Option<ValueFilter>,
    tag_id: Option<ValueFilter>,
}

impl Filter for PostTagFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        vec![
            FilterField::value("post_id", &self.post_id),
            FilterField::value("tag_id", &self.tag_id),
        ]
    }
}

impl TypedFilter for PostTagFilter {
    type Model = PostTag;
}

/// Composite-keyed model whose filter forgets one key
#[derive(Debug, Default, Clone)]
pub struct InvalidPostTag {
    pub post_id: i64,
    pub tag_id: i64,
}

impl Model for InvalidPostTag {
    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::column("post_id"), FieldDef::column("tag_id")]
    }

    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.post_id.into(),
            _ => self.tag_id.into(),
        }
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        match index {
            0 => self.post_id = convert(value, "post_id")?,
            _ => self.tag_id = convert(value, "tag_id")?,
        }
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct InvalidPostTagFilter {
    options: FilterOptions,
    post_id: Option<ValueFilter>,
}

impl Filter for InvalidPostTagFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        vec![FilterField::value("post_id", &self.post_id)]
    }
}

// node: self-referential tree

#[derive(Debug, Default, Clone)]
pub struct Node {
    pub id: i64,
    pub parent_id: i64,
    pub children: HasMany<Node>,
}

impl Node {
    pub fn new(id: i64, parent_id: i64) -> Self {
        Self {
            id,
            parent_id,
            children: HasMany::default(),
        }
    }
}

impl Model for Node {
    fn fields() -> Vec<FieldDef> {
        vec![
            FieldDef::column("id"),
            FieldDef::column("parent_id"),
            FieldDef::relation("children", Relation::reverse("node", "id", "parent_id")),
        ]
    }

    fn value(&self, index: usize) -> Value {
        match index {
            0 => self.id.into(),
            _ => self.parent_id.into(),
        }
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        match index {
            0 => self.id = convert(value, "id")?,
            _ => self.parent_id = convert(value, "parent_id")?,
        }
        Ok(())
    }

    fn relation_mut(&mut self, index: usize) -> Option<&mut dyn RelationSlot> {
        match index {
            2 => Some(&mut self.children),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct NodeFilter {
    options: FilterOptions,
    id: Option<ValueFilter>,
    parent_id: Option<ValueFilter>,
    children: Option<Box<NodeFilter>>,
}

impl NodeFilter {
    pub fn with_parent_id(mut self, filter: ValueFilter) -> Self {
        self.parent_id = Some(filter);
        self
    }

    pub fn with_children(mut self, filter: NodeFilter) -> Self {
        self.children = Some(Box::new(filter));
        self
    }
}

impl Filter for NodeFilter {
    fn options(&self) -> &FilterOptions {
        &self.options
    }

    fn fields(&self) -> Vec<FilterField<'_>> {
        vec![
            FilterField::value("id", &self.id),
            FilterField::value("parent_id", &self.parent_id),
            FilterField::eager("children", self.children.as_deref()),
        ]
    }
}

impl TypedFilter for NodeFilter {
    type Model = Node;
}

pub fn node_record(id: i64, parent_id: i64) -> Record {
    Record::new().with("id", id).with("parent_id", parent_id)
}

// shapes only used with local registries

#[derive(Debug, Default, Clone)]
pub struct Letters {
    pub values: [i64; 5],
}

impl Model for Letters {
    fn fields() -> Vec<FieldDef> {
        ["a", "b", "c", "d", "e"]
            .into_iter()
            .map(FieldDef::column)
            .collect()
    }

    fn value(&self, index: usize) -> Value {
        self.values.get(index).copied().unwrap_or_default().into()
    }

    fn set_value(&mut self, index: usize, value: Value) -> Result<(), OrmError> {
        if let Some(slot) = self.values.get_mut(index) {
            *slot = convert(value, "letter")?;
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct Columnless {
    pub scratch: String,
}

impl Model for Columnless {
    fn fields() -> Vec<FieldDef> {
        vec![FieldDef::excluded("scratch")]
    }

    fn value(&self, _index: usize) -> Value {
        Value::String(None)
    }

    fn set_value(&mut self, _index: usize, _value: Value) -> Result<(), OrmError> {
        Ok(())
    }
}

fn register_all() -> Result<(), OrmError> {
    schema::register::<Category>(DB, "category")
        .with_filter::<CategoryFilter>()
        .with_loader("id", |session, ids| {
            let filter = CategoryFilter {
                id: in_list(ids.to_vec())?,
                ..CategoryFilter::default()
            };
            Ok(LoadedRows::many(crud::select_all(session, &filter)?))
        })
        .register()?;
    schema::register::<Post>(DB, "post")
        .with_filter::<PostFilter>()
        .register()?;
    schema::register::<PostMetadata>(DB, "post_metadata")
        .with_filter::<PostMetadataFilter>()
        .with_loader("post_id", |session, ids| {
            let filter = PostMetadataFilter {
                post_id: in_list(ids.to_vec())?,
                ..PostMetadataFilter::default()
            };
            Ok(LoadedRows::many(crud::select_all(session, &filter)?))
        })
        .register()?;
    schema::register::<Tag>(DB, "tag")
        .with_filter::<TagFilter>()
        .register()?;
    schema::register::<PostTag>(DB, "post_tag")
        .with_keys(&["post_id", "tag_id"])
        .with_auto_increment(false)
        .with_filter::<PostTagFilter>()
        .register()?;
    schema::register::<InvalidPostTag>(DB, "invalid_post_tag")
        .with_keys(&["post_id", "tag_id"])
        .with_auto_increment(false)
        .with_filter::<InvalidPostTagFilter>()
        .register()?;
    schema::register::<Node>(DB, "node")
        .with_filter::<NodeFilter>()
        .with_loader("parent_id", |session, ids| {
            let filter = NodeFilter {
                parent_id: in_list(ids.to_vec())?,
                ..NodeFilter::default()
            };
            Ok(LoadedRows::many(crud::select_all(session, &filter)?))
        })
        .register()?;
    Ok(())
}

static FIXTURES: Once = Once::new();

/// Register the fixture schema in the global registries, once per process.
pub fn register_fixtures() {
    FIXTURES.call_once(|| register_all().unwrap());
}
