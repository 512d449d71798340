// src/store/mod.rs
//! Persistence: the in-memory collection, CSV files and the warehouse.

pub mod bigquery;
pub mod collection;
pub mod csv_store;
pub mod warehouse;

pub use bigquery::BigQueryClient;
pub use collection::{is_label_column, ArticleCollection, LabelColumn, TextColumn};
pub use csv_store::{CsvStore, FETCH_OUTPUT};
pub use warehouse::{upload, MemoryWarehouse, UploadReport, Warehouse, WarehouseTarget};
