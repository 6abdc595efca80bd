pub use sea_orm_migration::prelude::*;

mod m20250901_000001_create_stream_history_table;
mod m20250901_000002_create_temporary_links_table;
mod m20250901_000003_create_vod_cache_table;
mod m20250901_000004_create_linked_identities_table;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20250901_000001_create_stream_history_table::Migration),
            Box::new(m20250901_000002_create_temporary_links_table::Migration),
            Box::new(m20250901_000003_create_vod_cache_table::Migration),
            Box::new(m20250901_000004_create_linked_identities_table::Migration),
        ]
    }
}
