//! GraphQL document construction.
//!
//! Two document shapes exist: the account page query (repository
//! connection with inlined first pages of branches and tags) and the
//! batched continuation query (one aliased `repository(...)` sub-query
//! per entity that still has pending pages). Page size always travels as
//! the `$pageSize` variable; nothing is hard-coded into document text.
//!
//! Building a document is a pure transformation. Size limits on page and
//! batch values are validated once in
//! [`FetchOptions::validate`](crate::fetch::FetchOptions::validate)
//! before any document is built.

use std::fmt::Write as _;

use serde_json::{json, Map, Value};

use crate::model::AccountKind;

/// Commit fields the assembler consumes. Nothing more is requested:
/// selection size costs latency and rate-limit budget.
const COMMIT_FIELDS: &str = "oid author { name } committedDate message";

/// Resume point within one connection. A `None` cursor means "from the
/// beginning".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageCursor {
    pub after: Option<String>,
}

impl PageCursor {
    #[must_use]
    pub fn resuming_at(after: Option<String>) -> Self {
        Self { after }
    }
}

/// One repository slot in a batched continuation document. A repo that
/// needs both its branch and tag connections continued gets both inside
/// the same alias.
#[derive(Debug, Clone)]
pub struct BatchItem {
    /// Stable node id, used to demultiplex the response.
    pub repo_id: String,
    /// Repository name, passed as a query variable.
    pub name: String,
    /// `Some` when the branch connection has pending pages.
    pub branches: Option<PageCursor>,
    /// `Some` when the tag connection has pending pages.
    pub tags: Option<PageCursor>,
}

/// Deterministic alias for the batch slot at `index`.
#[must_use]
pub fn alias(index: usize) -> String {
    format!("r{index}")
}

/// Selection for a ref target, with one level of annotated-tag
/// dereferencing. Deeper chains are resolved by the assembler from
/// whatever the response carries.
fn target_selection(out: &mut String) {
    let _ = write!(
        out,
        "target {{ __typename ... on Commit {{ {COMMIT_FIELDS} }} \
         ... on Tag {{ target {{ __typename ... on Commit {{ {COMMIT_FIELDS} }} }} }} }}"
    );
}

/// Selection body shared by every `refs(...)` connection.
fn ref_connection_selection(out: &mut String) {
    out.push_str("{ nodes { name ");
    target_selection(out);
    out.push_str(" } pageInfo { hasNextPage endCursor } }");
}

/// Build the account page document for the given account kind.
///
/// The `user`/`organization` field is aliased to `account` so both kinds
/// share one response shape. Variables: `$login: String!`,
/// `$pageSize: Int!`, `$after: String`.
#[must_use]
pub fn account_page_document(kind: AccountKind) -> String {
    let mut doc = String::with_capacity(640);
    let _ = write!(
        doc,
        "query AccountPage($login: String!, $pageSize: Int!, $after: String) {{ \
         account: {}(login: $login) {{ \
         repositories(first: $pageSize, after: $after, orderBy: {{field: NAME, direction: ASC}}) {{ \
         nodes {{ id name description url isPrivate isFork \
         branches: refs(refPrefix: \"refs/heads/\", first: $pageSize) ",
        kind.graphql_field()
    );
    ref_connection_selection(&mut doc);
    doc.push_str(" tags: refs(refPrefix: \"refs/tags/\", first: $pageSize) ");
    ref_connection_selection(&mut doc);
    doc.push_str(" } pageInfo { hasNextPage endCursor } } } }");
    doc
}

/// Variables for [`account_page_document`].
#[must_use]
pub fn account_page_variables(login: &str, page_size: u32, after: Option<&str>) -> Value {
    json!({
        "login": login,
        "pageSize": page_size,
        "after": after,
    })
}

/// Build one batched continuation document for the given slots.
///
/// Aliases are positional (`r0`, `r1`, ...) and therefore collision-free
/// within a document. Repository names and cursors travel as variables
/// (`$name0`, `$b0`, `$t0`, ...) so no response token is ever spliced
/// into document text.
#[must_use]
pub fn continuation_document(items: &[BatchItem]) -> String {
    let mut decls = String::from("$owner: String!, $pageSize: Int!");
    let mut body = String::new();

    for (idx, item) in items.iter().enumerate() {
        let _ = write!(decls, ", $name{idx}: String!");
        let _ = write!(
            body,
            " {}: repository(owner: $owner, name: $name{idx}) {{",
            alias(idx)
        );
        if item.branches.is_some() {
            let _ = write!(decls, ", $b{idx}: String");
            let _ = write!(
                body,
                " branches: refs(refPrefix: \"refs/heads/\", first: $pageSize, after: $b{idx}) "
            );
            ref_connection_selection(&mut body);
        }
        if item.tags.is_some() {
            let _ = write!(decls, ", $t{idx}: String");
            let _ = write!(
                body,
                " tags: refs(refPrefix: \"refs/tags/\", first: $pageSize, after: $t{idx}) "
            );
            ref_connection_selection(&mut body);
        }
        body.push_str(" }");
    }

    format!("query ContinuationBatch({decls}) {{{body} }}")
}

/// Variables for [`continuation_document`].
#[must_use]
pub fn continuation_variables(items: &[BatchItem], owner: &str, page_size: u32) -> Value {
    let mut vars = Map::new();
    vars.insert("owner".into(), json!(owner));
    vars.insert("pageSize".into(), json!(page_size));
    for (idx, item) in items.iter().enumerate() {
        vars.insert(format!("name{idx}"), json!(item.name));
        if let Some(cursor) = &item.branches {
            vars.insert(format!("b{idx}"), json!(cursor.after));
        }
        if let Some(cursor) = &item.tags {
            vars.insert(format!("t{idx}"), json!(cursor.after));
        }
    }
    Value::Object(vars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(id: &str, name: &str, branches: Option<&str>, tags: Option<&str>) -> BatchItem {
        BatchItem {
            repo_id: id.to_string(),
            name: name.to_string(),
            branches: branches.map(|c| PageCursor::resuming_at(Some(c.to_string()))),
            tags: tags.map(|c| PageCursor::resuming_at(Some(c.to_string()))),
        }
    }

    #[test]
    fn account_document_selects_kind_field() {
        let user = account_page_document(AccountKind::User);
        assert!(user.contains("account: user(login: $login)"));
        assert!(user.contains("refPrefix: \"refs/heads/\""));
        assert!(user.contains("refPrefix: \"refs/tags/\""));

        let org = account_page_document(AccountKind::Organization);
        assert!(org.contains("account: organization(login: $login)"));
    }

    #[test]
    fn page_size_is_a_variable_not_a_literal() {
        let doc = account_page_document(AccountKind::User);
        assert!(doc.contains("first: $pageSize"));
        assert!(!doc.contains("first: 100"));

        let vars = account_page_variables("octocat", 25, Some("CURSOR"));
        assert_eq!(vars["pageSize"], 25);
        assert_eq!(vars["after"], "CURSOR");
    }

    #[test]
    fn continuation_aliases_are_positional() {
        let items = vec![
            item("id-a", "alpha", Some("cA"), None),
            item("id-b", "beta", None, Some("cB")),
            item("id-c", "gamma", Some("c1"), Some("c2")),
        ];
        let doc = continuation_document(&items);

        assert!(doc.contains("r0: repository(owner: $owner, name: $name0)"));
        assert!(doc.contains("r1: repository(owner: $owner, name: $name1)"));
        assert!(doc.contains("r2: repository(owner: $owner, name: $name2)"));
        // r0 asks only for branches, r1 only for tags.
        assert!(doc.contains("$b0: String"));
        assert!(!doc.contains("$t0: String"));
        assert!(doc.contains("$t1: String"));
        assert!(!doc.contains("$b1: String"));
        assert!(doc.contains("$b2: String") && doc.contains("$t2: String"));
    }

    #[test]
    fn continuation_variables_carry_cursors() {
        let items = vec![item("id-a", "alpha", Some("cA"), Some("cT"))];
        let vars = continuation_variables(&items, "octocat", 50);
        assert_eq!(vars["owner"], "octocat");
        assert_eq!(vars["pageSize"], 50);
        assert_eq!(vars["name0"], "alpha");
        assert_eq!(vars["b0"], "cA");
        assert_eq!(vars["t0"], "cT");
    }
}
