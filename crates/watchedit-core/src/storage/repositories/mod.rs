mod app_state_repository;
mod tag_repository;
mod work_repository;

pub use app_state_repository::{AppStateRepository, SqliteAppStateRepository, StateEntry};
pub use tag_repository::{SqliteTagRepository, TagRepository};
pub use work_repository::{
    ProgressFilter, SqliteWorkRepository, WorkFilter, WorkPage, WorkRepository,
};

pub(crate) use tag_repository::write_tag;
pub(crate) use work_repository::write_work;

use crate::error::Result;

pub trait Repository {
    type Entity;
    type Id;

    fn find_by_id(&self, id: &Self::Id) -> Result<Option<Self::Entity>>;
    fn save(&self, entity: &Self::Entity) -> Result<()>;
    fn delete(&self, id: &Self::Id) -> Result<bool>;
}

/// Wrap a text column that failed to parse into the error rusqlite uses for
/// type conversions, so row mappers can stay `rusqlite::Result`.
pub(crate) fn conversion_error(
    column: usize,
    err: impl Into<Box<dyn std::error::Error + Send + Sync>>,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, err.into())
}
