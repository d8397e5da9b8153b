//! CloudAtlas – a hierarchical zone query engine.
//!
//! Machines are leaves of a tree of zones. Every zone carries a map of typed
//! attributes, and the attributes of an inner zone are computed from its
//! children's attributes by SQL-like queries:
//!
//! ```text
//! SELECT avg(cpu_usage) AS cpu_usage WHERE cpu_usage > 0;
//! SELECT to_set(unfold(contacts)) AS contacts ORDER BY name
//! ```
//!
//! A query is evaluated at a zone against a table with one row per child and
//! one column per attribute name. Expressions are evaluated either per row
//! (`WHERE`, `ORDER BY`) or over whole columns (`SELECT`), where operators
//! broadcast single values over columns and aggregates fold a column into a
//! single value. Installed queries are re-evaluated periodically, bottom-up,
//! so that every level of the tree stays current.
//!
//! ## Modules
//! * [`datatype`] – The [`datatype::Value`] and [`datatype::Type`] model with
//!   three-valued logic, arithmetic, ordering and conversions.
//! * [`construct`] – Attributes, attribute maps, path names and the
//!   [`construct::ZoneTree`].
//! * [`table`] and [`result`] – The relational view of a zone's children and
//!   the single/column result shapes.
//! * [`functions`] – Scalar functions, aggregates and column transforms.
//! * [`ast`] and [`parser`] – The query language (grammar in `query.pest`).
//! * [`interpreter`] – Statement evaluation with error breadcrumbs.
//! * [`engine`] and [`interface`] – Execution over the tree, installation and
//!   periodic re-evaluation on the tokio runtime.
//! * [`config`] and [`server`] – Settings and the HTTP surface.
//! * [`sample`] – The reference hierarchy used by demos, tests and benches.
//!
//! ## Quick Start
//! ```
//! use cloudatlas::{construct::PathName, engine::{Engine, EngineSettings}, sample};
//! let engine = Engine::new(sample::hierarchy().unwrap(), EngineSettings::default()).unwrap();
//! let uw = engine.find(&"/uw".parse::<PathName>().unwrap()).unwrap();
//! let results = engine.execute_text(uw, "SELECT count(name) AS n").unwrap();
//! assert_eq!(results["/uw: n"].to_string(), "3");
//! ```

pub mod ast;
pub mod config;
pub mod construct;
pub mod datatype;
pub mod engine;
pub mod error;
pub mod functions;
pub mod interface;
pub mod interpreter;
pub mod parser;
pub mod result;
pub mod sample;
pub mod server;
pub mod table;
