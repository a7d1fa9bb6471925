pub mod api_client;
pub mod cell_renderer;
pub mod column_manager;
pub mod config;
pub mod data_exporter;
pub mod datasource_adapter;
pub mod datasource_trait;
pub mod image_resolver;
pub mod logging;
pub mod presets;
pub mod running_notes;
pub mod search_filter;
pub mod table_renderer;
pub mod view;
