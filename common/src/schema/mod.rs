pub mod table_schema;
