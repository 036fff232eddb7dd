//! MCP server that exposes GitHub operations as tools for LLM assistants.
//!
//! Provides tools for searching repositories and issues, creating and
//! updating issues and pull requests, and managing repository settings,
//! GitHub Actions workflows, and collaborators. Each tool maps a typed
//! parameter struct onto one (rarely two) GitHub REST API calls.

pub mod error;
pub mod github;
pub mod server;
