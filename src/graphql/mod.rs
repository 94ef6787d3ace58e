use async_graphql::{Context, EmptySubscription, ErrorExtensions, Result, Schema};

use crate::db::DynStore;
use crate::email::Mailer;
use crate::error::CadenceError;
use crate::graphql::mutation::MutationRoot;
use crate::graphql::query::QueryRoot;
use crate::models::user::session::TokenKeys;
use crate::models::user::User;

pub mod guards;
pub mod mutation;
pub mod query;

pub const SUCCESS_MESSAGE: &str = "success";

pub type CadenceSchema = Schema<QueryRoot, MutationRoot, EmptySubscription>;

/// Builds the schema with everything resolvers read from the context.
///
/// The logged-in [`User`], if any, is attached per request.
pub fn build_schema(store: DynStore, keys: TokenKeys, mailer: Mailer) -> CadenceSchema {
    Schema::build(QueryRoot, MutationRoot, EmptySubscription)
        .data(store)
        .data(keys)
        .data(mailer)
        .finish()
}

pub fn current_user<'c>(ctx: &Context<'c>) -> Result<&'c User> {
    ctx.data_opt::<User>()
        .ok_or_else(|| CadenceError::Unauthenticated.extend())
}
