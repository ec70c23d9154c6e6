//! Types for the PostgrestClient

/// `Prefer` header asking for the written rows in the response
pub const RETURN_REPRESENTATION: &str = "return=representation";

/// `Accept` header asking PostgREST for exactly one object instead of an array.
///
/// Zero or several matching rows make PostgREST answer 406 with code `PGRST116`.
pub const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
