// Copyright 2025 Cowboy AI, LLC.

//! Mutation planner
//!
//! Translates `(ChangeEvent, TableRule)` into an ordered list of
//! [`Mutation`]s: parameterised query templates plus parameter bags. The
//! planner performs no I/O; executing the mutations is the writer's job.
//!
//! Templates are deterministic per (operation, rule shape, labels,
//! relationship type) and are cached on the planner instance. Parameter
//! bags are built fresh for every event.
//!
//! Edge upserts deliberately use `MATCH … MATCH … MERGE`: if an endpoint
//! has not arrived yet the merge matches nothing and writes nothing, and a
//! later event touching the same row recreates the edge once both ends
//! exist.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::envelope::ChangeEvent;
use crate::error::{Result, SyncError};
use crate::schema::{Direction, EdgeRule, OwnedEdge, TableRule};

/// Scalar parameter value bound into a graph query
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    /// UTF-8 string
    String(String),
    /// Signed 64-bit integer
    Integer(i64),
    /// 64-bit float
    Float(f64),
    /// Boolean
    Boolean(bool),
}

/// A query parameter: a scalar or one nested map of properties
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// Plain scalar
    Scalar(Scalar),
    /// Nested property map (`$props`)
    Props(Vec<(String, Scalar)>),
}

/// What a mutation does; used for logging and metrics only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    /// `MERGE` a node and fold its properties
    UpsertNode,
    /// `DETACH DELETE` a node
    DeleteNode,
    /// `MERGE` a relationship
    UpsertEdge,
    /// `DELETE` a relationship
    DeleteEdge,
    /// Fold properties onto an existing node
    MergeProperties,
}

/// One parameterised graph mutation
#[derive(Debug, Clone, PartialEq)]
pub struct Mutation {
    /// Mutation kind, for diagnostics
    pub kind: MutationKind,
    /// Parameterised query template, shared with the planner's cache
    pub template: Arc<str>,
    /// Parameter bindings in declaration order
    pub params: Vec<(String, ParamValue)>,
}

impl Mutation {
    /// Look up a parameter by name
    pub fn param(&self, name: &str) -> Option<&ParamValue> {
        self.params
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value)
    }
}

/// Coerce a JSON column value into a supported scalar
///
/// Null, arrays, and objects yield `None` and are omitted from property
/// bags; existing graph properties are never unset by a null column.
pub fn coerce_scalar(value: &Value) -> Option<Scalar> {
    match value {
        Value::String(s) => Some(Scalar::String(s.clone())),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Scalar::Integer(i))
            } else {
                n.as_f64().map(Scalar::Float)
            }
        }
        Value::Bool(b) => Some(Scalar::Boolean(*b)),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

/// Coerce an identifier column: strings bind as strings, integers as
/// integers, anything else is a rule violation
fn coerce_id(value: &Value) -> Option<Scalar> {
    match value {
        Value::String(s) => Some(Scalar::String(s.clone())),
        Value::Number(n) => n.as_i64().map(Scalar::Integer),
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum TemplateKey {
    UpsertNode(String),
    DeleteNode(String),
    UpsertEdge {
        from: String,
        to: String,
        rel: String,
        with_props: bool,
    },
    DeleteEdge {
        from: String,
        to: String,
        rel: String,
    },
    MergeProperties(String),
}

/// Plans graph mutations for change events
///
/// Owns the template cache; one planner lives for the whole consumption
/// loop.
#[derive(Debug, Default)]
pub struct MutationPlanner {
    templates: HashMap<TemplateKey, Arc<str>>,
}

impl MutationPlanner {
    /// Create a planner with an empty template cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Plan the ordered mutations for one event under its table's rule
    ///
    /// Mutations must be executed in the returned order; for composite
    /// rules the node precedes the edges that reference it.
    pub fn plan(&mut self, event: &ChangeEvent, rule: &TableRule) -> Result<Vec<Mutation>> {
        let mut mutations = Vec::new();
        self.plan_rule(event, rule, &mut mutations)?;
        Ok(mutations)
    }

    fn plan_rule(
        &mut self,
        event: &ChangeEvent,
        rule: &TableRule,
        out: &mut Vec<Mutation>,
    ) -> Result<()> {
        match rule {
            TableRule::Node { label, id_column } => {
                self.plan_node(event, label, id_column, out)?;
            }
            TableRule::NodeWithEdges {
                label,
                id_column,
                edges,
            } => {
                let id = self.plan_node(event, label, id_column, out)?;
                // DETACH DELETE on the node already removes incident edges.
                if !event.op.is_delete() {
                    for edge in edges {
                        self.plan_owned_edge(event, label, &id, edge, out)?;
                    }
                }
            }
            TableRule::PropertyMerge {
                label,
                id_column,
                properties,
            } => {
                // Retracting the one-to-one row never deletes its owner.
                if !event.op.is_delete() {
                    self.plan_property_merge(event, label, id_column, properties, out)?;
                }
            }
            TableRule::Edge(edge) => {
                self.plan_edge(event, edge, &[], out)?;
            }
            TableRule::EdgeWithProps { edge, columns } => {
                self.plan_edge(event, edge, columns, out)?;
            }
            TableRule::Composite(rules) => {
                for rule in rules {
                    // On delete the node rules' DETACH DELETE covers the
                    // edges; planning edge deletes would match nothing.
                    if event.op.is_delete() && matches!(rule, TableRule::Edge(_)) {
                        continue;
                    }
                    self.plan_rule(event, rule, out)?;
                }
            }
        }
        Ok(())
    }

    fn plan_node(
        &mut self,
        event: &ChangeEvent,
        label: &str,
        id_column: &str,
        out: &mut Vec<Mutation>,
    ) -> Result<Scalar> {
        let id = self.identifier(event, id_column)?;

        if event.op.is_delete() {
            let template = self.template(TemplateKey::DeleteNode(label.to_string()), || {
                format!("MATCH (n:{label} {{id: $id}}) DETACH DELETE n")
            });
            out.push(Mutation {
                kind: MutationKind::DeleteNode,
                template,
                params: vec![("id".to_string(), ParamValue::Scalar(id.clone()))],
            });
        } else {
            let template = self.template(TemplateKey::UpsertNode(label.to_string()), || {
                format!("MERGE (n:{label} {{id: $id}}) SET n += $props")
            });
            let props: Vec<(String, Scalar)> = event
                .row
                .iter()
                .filter_map(|(column, value)| {
                    coerce_scalar(value).map(|scalar| (column.clone(), scalar))
                })
                .collect();
            out.push(Mutation {
                kind: MutationKind::UpsertNode,
                template,
                params: vec![
                    ("id".to_string(), ParamValue::Scalar(id.clone())),
                    ("props".to_string(), ParamValue::Props(props)),
                ],
            });
        }
        Ok(id)
    }

    fn plan_owned_edge(
        &mut self,
        event: &ChangeEvent,
        label: &str,
        id: &Scalar,
        edge: &OwnedEdge,
        out: &mut Vec<Mutation>,
    ) -> Result<()> {
        let fk = match event.row.get(&edge.fk_column) {
            None | Some(Value::Null) => {
                if edge.optional {
                    return Ok(());
                }
                return Err(SyncError::Mapping {
                    table: event.table.clone(),
                    reason: format!(
                        "column '{}' required by edge {} is absent or null",
                        edge.fk_column, edge.rel_type
                    ),
                });
            }
            Some(value) => coerce_id(value).ok_or_else(|| SyncError::Mapping {
                table: event.table.clone(),
                reason: format!("column '{}' is not a valid identifier", edge.fk_column),
            })?,
        };

        let (from_label, from_id, to_label, to_id) = match edge.direction {
            Direction::Outbound => (label, id.clone(), edge.peer_label.as_str(), fk),
            Direction::Inbound => (edge.peer_label.as_str(), fk, label, id.clone()),
        };

        let template = self.template(
            TemplateKey::UpsertEdge {
                from: from_label.to_string(),
                to: to_label.to_string(),
                rel: edge.rel_type.clone(),
                with_props: false,
            },
            || upsert_edge_template(from_label, to_label, &edge.rel_type, false),
        );
        out.push(Mutation {
            kind: MutationKind::UpsertEdge,
            template,
            params: vec![
                ("from_id".to_string(), ParamValue::Scalar(from_id)),
                ("to_id".to_string(), ParamValue::Scalar(to_id)),
            ],
        });
        Ok(())
    }

    fn plan_edge(
        &mut self,
        event: &ChangeEvent,
        edge: &EdgeRule,
        prop_columns: &[String],
        out: &mut Vec<Mutation>,
    ) -> Result<()> {
        let Some(from_id) = self.endpoint(event, edge, &edge.from_column)? else {
            return Ok(());
        };
        let Some(to_id) = self.endpoint(event, edge, &edge.to_column)? else {
            return Ok(());
        };

        if event.op.is_delete() {
            let template = self.template(
                TemplateKey::DeleteEdge {
                    from: edge.from_label.clone(),
                    to: edge.to_label.clone(),
                    rel: edge.rel_type.clone(),
                },
                || {
                    format!(
                        "MATCH (a:{} {{id: $from_id}})-[r:{}]->(b:{} {{id: $to_id}}) DELETE r",
                        edge.from_label, edge.rel_type, edge.to_label
                    )
                },
            );
            out.push(Mutation {
                kind: MutationKind::DeleteEdge,
                template,
                params: vec![
                    ("from_id".to_string(), ParamValue::Scalar(from_id)),
                    ("to_id".to_string(), ParamValue::Scalar(to_id)),
                ],
            });
            return Ok(());
        }

        let with_props = !prop_columns.is_empty();
        let template = self.template(
            TemplateKey::UpsertEdge {
                from: edge.from_label.clone(),
                to: edge.to_label.clone(),
                rel: edge.rel_type.clone(),
                with_props,
            },
            || upsert_edge_template(&edge.from_label, &edge.to_label, &edge.rel_type, with_props),
        );

        let mut params = vec![
            ("from_id".to_string(), ParamValue::Scalar(from_id)),
            ("to_id".to_string(), ParamValue::Scalar(to_id)),
        ];
        if with_props {
            let props: Vec<(String, Scalar)> = prop_columns
                .iter()
                .filter_map(|column| {
                    event
                        .row
                        .get(column)
                        .and_then(coerce_scalar)
                        .map(|scalar| (column.clone(), scalar))
                })
                .collect();
            params.push(("props".to_string(), ParamValue::Props(props)));
        }
        out.push(Mutation {
            kind: MutationKind::UpsertEdge,
            template,
            params,
        });
        Ok(())
    }

    fn plan_property_merge(
        &mut self,
        event: &ChangeEvent,
        label: &str,
        id_column: &str,
        properties: &[(String, String)],
        out: &mut Vec<Mutation>,
    ) -> Result<()> {
        let id = self.identifier(event, id_column)?;

        let template = self.template(
            TemplateKey::MergeProperties(event.table.clone()),
            || {
                let assignments = properties
                    .iter()
                    .map(|(source, target)| format!("u.{target} = ${source}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!("MERGE (u:{label} {{id: ${id_column}}}) SET {assignments}")
            },
        );

        let mut params = vec![(id_column.to_string(), ParamValue::Scalar(id))];
        for (source, _) in properties {
            // Absent or null source columns bind empty strings rather than
            // varying the template shape.
            let value = event
                .row
                .get(source)
                .and_then(coerce_scalar)
                .unwrap_or(Scalar::String(String::new()));
            params.push((source.clone(), ParamValue::Scalar(value)));
        }
        out.push(Mutation {
            kind: MutationKind::MergeProperties,
            template,
            params,
        });
        Ok(())
    }

    /// Resolve one edge endpoint; `Ok(None)` means the edge is suppressed
    fn endpoint(
        &self,
        event: &ChangeEvent,
        edge: &EdgeRule,
        column: &str,
    ) -> Result<Option<Scalar>> {
        match event.row.get(column) {
            None | Some(Value::Null) => {
                if edge.optional {
                    Ok(None)
                } else {
                    Err(SyncError::Mapping {
                        table: event.table.clone(),
                        reason: format!(
                            "column '{column}' required by edge {} is absent or null",
                            edge.rel_type
                        ),
                    })
                }
            }
            Some(value) => coerce_id(value)
                .map(Some)
                .ok_or_else(|| SyncError::Mapping {
                    table: event.table.clone(),
                    reason: format!("column '{column}' is not a valid identifier"),
                }),
        }
    }

    fn identifier(&self, event: &ChangeEvent, id_column: &str) -> Result<Scalar> {
        let value = event.row.get(id_column).ok_or_else(|| SyncError::Mapping {
            table: event.table.clone(),
            reason: format!("row has no identifier column '{id_column}'"),
        })?;
        coerce_id(value).ok_or_else(|| SyncError::Mapping {
            table: event.table.clone(),
            reason: format!("identifier column '{id_column}' is neither string nor integer"),
        })
    }

    fn template(&mut self, key: TemplateKey, build: impl FnOnce() -> String) -> Arc<str> {
        self.templates
            .entry(key)
            .or_insert_with(|| Arc::from(build()))
            .clone()
    }
}

fn upsert_edge_template(from: &str, to: &str, rel: &str, with_props: bool) -> String {
    if with_props {
        format!(
            "MATCH (a:{from} {{id: $from_id}}) MATCH (b:{to} {{id: $to_id}}) \
             MERGE (a)-[r:{rel}]->(b) SET r += $props"
        )
    } else {
        format!(
            "MATCH (a:{from} {{id: $from_id}}) MATCH (b:{to} {{id: $to_id}}) \
             MERGE (a)-[:{rel}]->(b)"
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::ChangeOp;
    use serde_json::json;

    fn event(op: ChangeOp, table: &str, row: serde_json::Value) -> ChangeEvent {
        let serde_json::Value::Object(row) = row else {
            panic!("row must be an object");
        };
        ChangeEvent {
            op,
            table: table.to_string(),
            row,
            topic: format!("cdc.db.{table}"),
        }
    }

    fn rule(table: &str) -> TableRule {
        crate::schema::SchemaRegistry::standard()
            .lookup(table)
            .expect("declared table")
            .clone()
    }

    #[test]
    fn scalar_coercion_skips_unsupported_kinds() {
        assert_eq!(coerce_scalar(&json!("x")), Some(Scalar::String("x".into())));
        assert_eq!(coerce_scalar(&json!(5)), Some(Scalar::Integer(5)));
        assert_eq!(coerce_scalar(&json!(1.5)), Some(Scalar::Float(1.5)));
        assert_eq!(coerce_scalar(&json!(true)), Some(Scalar::Boolean(true)));
        assert_eq!(coerce_scalar(&json!(null)), None);
        assert_eq!(coerce_scalar(&json!([1])), None);
        assert_eq!(coerce_scalar(&json!({"a": 1})), None);
    }

    #[test]
    fn node_upsert_omits_null_columns() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Create,
            "users",
            json!({"id": 101, "first_name": "John", "deleted_at": null}),
        );
        let mutations = planner.plan(&event, &rule("users")).unwrap();
        assert_eq!(mutations.len(), 1);
        let Some(ParamValue::Props(props)) = mutations[0].param("props") else {
            panic!("expected props param");
        };
        assert!(props.iter().any(|(k, _)| k == "first_name"));
        assert!(!props.iter().any(|(k, _)| k == "deleted_at"));
    }

    #[test]
    fn string_and_integer_ids_both_bind() {
        let mut planner = MutationPlanner::new();
        let numeric = event(ChangeOp::Create, "users", json!({"id": 101}));
        let text = event(ChangeOp::Update, "users", json!({"id": "abc-1"}));
        let rule = rule("users");

        let planned = planner.plan(&numeric, &rule).unwrap();
        assert_eq!(
            planned[0].param("id"),
            Some(&ParamValue::Scalar(Scalar::Integer(101)))
        );
        let planned = planner.plan(&text, &rule).unwrap();
        assert_eq!(
            planned[0].param("id"),
            Some(&ParamValue::Scalar(Scalar::String("abc-1".into())))
        );
    }

    #[test]
    fn bad_identifier_is_a_mapping_error() {
        let mut planner = MutationPlanner::new();
        let event = event(ChangeOp::Create, "users", json!({"id": true}));
        let err = planner.plan(&event, &rule("users")).unwrap_err();
        assert!(matches!(err, SyncError::Mapping { .. }));

        let missing = self::event(ChangeOp::Create, "users", json!({"name": "x"}));
        let err = planner.plan(&missing, &rule("users")).unwrap_err();
        assert!(matches!(err, SyncError::Mapping { .. }));
    }

    #[test]
    fn templates_are_cached_per_shape() {
        let mut planner = MutationPlanner::new();
        let rule = rule("users");
        let first = planner
            .plan(&event(ChangeOp::Create, "users", json!({"id": 1})), &rule)
            .unwrap();
        let second = planner
            .plan(&event(ChangeOp::Update, "users", json!({"id": 2})), &rule)
            .unwrap();
        assert!(Arc::ptr_eq(&first[0].template, &second[0].template));
    }

    #[test]
    fn optional_owned_edge_is_suppressed_on_null() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Create,
            "projects",
            json!({"id": 9, "name": "apollo", "managed_by_user_id": null}),
        );
        let mutations = planner.plan(&event, &rule("projects")).unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].kind, MutationKind::UpsertNode);
    }

    #[test]
    fn required_owned_edge_missing_is_a_mapping_error() {
        let mut planner = MutationPlanner::new();
        let event = event(ChangeOp::Create, "ideas", json!({"id": 4, "title": "t"}));
        let err = planner.plan(&event, &rule("ideas")).unwrap_err();
        assert!(matches!(err, SyncError::Mapping { .. }));
    }

    #[test]
    fn inbound_and_outbound_edges_orient_correctly() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Create,
            "notifications",
            json!({"id": 1, "sender_user_id": 2, "receiver_user_id": 3}),
        );
        let mutations = planner.plan(&event, &rule("notifications")).unwrap();
        assert_eq!(mutations.len(), 3);

        // (User)-[:SENT]->(Notification): user id feeds $from_id.
        assert!(mutations[1].template.contains("MATCH (a:User"));
        assert_eq!(
            mutations[1].param("from_id"),
            Some(&ParamValue::Scalar(Scalar::Integer(2)))
        );
        // (Notification)-[:RECEIVED_BY]->(User): user id feeds $to_id.
        assert!(mutations[2].template.contains("MATCH (a:Notification"));
        assert_eq!(
            mutations[2].param("to_id"),
            Some(&ParamValue::Scalar(Scalar::Integer(3)))
        );
    }

    #[test]
    fn node_delete_emits_no_edge_mutations() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Delete,
            "businesses",
            json!({"id": 5, "operator_user_id": 7, "business_type_id": 3}),
        );
        let mutations = planner.plan(&event, &rule("businesses")).unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].kind, MutationKind::DeleteNode);
        assert!(mutations[0].template.contains("DETACH DELETE"));
    }

    #[test]
    fn edge_delete_uses_matched_relationship() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Delete,
            "user_skills",
            json!({"user_id": 101, "skill_id": 202}),
        );
        let mutations = planner.plan(&event, &rule("user_skills")).unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(
            mutations[0].template.as_ref(),
            "MATCH (a:User {id: $from_id})-[r:HAS_SKILL]->(b:Skill {id: $to_id}) DELETE r"
        );
    }

    #[test]
    fn edge_with_props_keeps_only_supported_payload() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Create,
            "idea_votes",
            json!({"voter_user_id": 1, "idea_id": 2, "type": "up", "comment": null}),
        );
        let mutations = planner.plan(&event, &rule("idea_votes")).unwrap();
        assert!(mutations[0].template.contains("SET r += $props"));
        let Some(ParamValue::Props(props)) = mutations[0].param("props") else {
            panic!("expected props");
        };
        assert_eq!(props, &vec![("type".to_string(), Scalar::String("up".into()))]);
    }

    #[test]
    fn composite_emits_node_before_edges() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Create,
            "business_connections",
            json!({
                "id": 10,
                "initiator_business_id": 20,
                "receiver_business_id": 30,
                "connection_type_id": 40
            }),
        );
        let mutations = planner
            .plan(&event, &rule("business_connections"))
            .unwrap();
        assert_eq!(mutations.len(), 4);
        assert_eq!(mutations[0].kind, MutationKind::UpsertNode);
        assert!(mutations[1..]
            .iter()
            .all(|m| m.kind == MutationKind::UpsertEdge));
    }

    #[test]
    fn composite_without_type_fk_skips_that_edge() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Create,
            "business_connections",
            json!({"id": 10, "initiator_business_id": 20, "receiver_business_id": 30}),
        );
        let mutations = planner
            .plan(&event, &rule("business_connections"))
            .unwrap();
        assert_eq!(mutations.len(), 3);
        assert!(!mutations
            .iter()
            .any(|m| m.template.contains("HAS_TYPE")));
    }

    #[test]
    fn composite_delete_is_only_the_node_delete() {
        let mut planner = MutationPlanner::new();
        let event = event(
            ChangeOp::Delete,
            "business_connections",
            json!({"id": 10, "initiator_business_id": 20, "receiver_business_id": 30}),
        );
        let mutations = planner
            .plan(&event, &rule("business_connections"))
            .unwrap();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].kind, MutationKind::DeleteNode);
    }
}
