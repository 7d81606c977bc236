// Copyright 2025 Cowboy AI, LLC.

//! End-to-end projection scenarios
//!
//! Each test feeds a literal Debezium payload through the projector with a
//! recording executor and asserts on the exact queries and parameter bags
//! that would reach the graph.

use cdc_graph_sync::{
    Disposition, ParamValue, Projector, RecordingExecutor, Scalar, SchemaRegistry,
};

fn projector() -> Projector<RecordingExecutor> {
    Projector::new(SchemaRegistry::standard(), RecordingExecutor::new())
}

fn scalar(value: &ParamValue) -> &Scalar {
    match value {
        ParamValue::Scalar(scalar) => scalar,
        ParamValue::Props(_) => panic!("expected scalar param"),
    }
}

#[tokio::test]
async fn user_create_becomes_a_node_upsert() {
    let mut projector = projector();
    let payload = br#"{
        "payload": {
            "op": "c",
            "after": { "id": 101, "first_name": "John", "last_name": "Doe" },
            "source": { "table": "users" }
        }
    }"#;

    let disposition = projector.apply("tia_server.dev_tia_db.users", payload).await;
    assert!(matches!(disposition, Disposition::Applied(1)));

    let executed = projector.writer().executed();
    assert_eq!(
        executed[0].template.as_ref(),
        "MERGE (n:User {id: $id}) SET n += $props"
    );
    assert_eq!(scalar(executed[0].param("id").unwrap()), &Scalar::Integer(101));

    let Some(ParamValue::Props(props)) = executed[0].param("props") else {
        panic!("expected props param");
    };
    assert_eq!(
        props,
        &vec![
            ("first_name".to_string(), Scalar::String("John".into())),
            ("id".to_string(), Scalar::Integer(101)),
            ("last_name".to_string(), Scalar::String("Doe".into())),
        ]
    );
}

#[tokio::test]
async fn user_skill_create_becomes_an_edge_merge() {
    let mut projector = projector();
    let payload = br#"{
        "payload": {
            "op": "c",
            "after": { "user_id": 101, "skill_id": 202 },
            "source": { "table": "user_skills" }
        }
    }"#;

    let disposition = projector
        .apply("tia_server.dev_tia_db.user_skills", payload)
        .await;
    assert!(matches!(disposition, Disposition::Applied(1)));

    let executed = projector.writer().executed();
    assert_eq!(
        executed[0].template.as_ref(),
        "MATCH (a:User {id: $from_id}) MATCH (b:Skill {id: $to_id}) MERGE (a)-[:HAS_SKILL]->(b)"
    );
    assert_eq!(
        scalar(executed[0].param("from_id").unwrap()),
        &Scalar::Integer(101)
    );
    assert_eq!(
        scalar(executed[0].param("to_id").unwrap()),
        &Scalar::Integer(202)
    );
}

#[tokio::test]
async fn user_delete_detaches_the_node() {
    let mut projector = projector();
    let payload = br#"{
        "payload": {
            "op": "d",
            "before": { "id": 101, "first_name": "John" },
            "after": null,
            "source": { "table": "users" }
        }
    }"#;

    let disposition = projector.apply("tia_server.dev_tia_db.users", payload).await;
    assert!(matches!(disposition, Disposition::Applied(1)));

    let executed = projector.writer().executed();
    assert_eq!(
        executed[0].template.as_ref(),
        "MATCH (n:User {id: $id}) DETACH DELETE n"
    );
    assert_eq!(scalar(executed[0].param("id").unwrap()), &Scalar::Integer(101));
}

#[tokio::test]
async fn user_login_merges_onto_the_user_and_never_deletes_it() {
    let mut projector = projector();
    let create = br#"{
        "payload": {
            "op": "c",
            "after": { "user_id": 101, "login_email": "a@b" },
            "source": { "table": "user_logins" }
        }
    }"#;

    let disposition = projector
        .apply("tia_server.dev_tia_db.user_logins", create)
        .await;
    assert!(matches!(disposition, Disposition::Applied(1)));

    let executed = projector.writer().executed();
    assert_eq!(
        executed[0].template.as_ref(),
        "MERGE (u:User {id: $user_id}) SET u.loginEmail = $login_email"
    );
    assert_eq!(
        scalar(executed[0].param("user_id").unwrap()),
        &Scalar::Integer(101)
    );
    assert_eq!(
        scalar(executed[0].param("login_email").unwrap()),
        &Scalar::String("a@b".into())
    );

    // Retracting the login row leaves the User alone.
    let delete = br#"{
        "payload": {
            "op": "d",
            "before": { "user_id": 101, "login_email": "a@b" },
            "after": null,
            "source": { "table": "user_logins" }
        }
    }"#;
    let disposition = projector
        .apply("tia_server.dev_tia_db.user_logins", delete)
        .await;
    assert!(matches!(disposition, Disposition::Applied(0)));
    assert_eq!(projector.writer().executed().len(), 1);
}

#[tokio::test]
async fn business_create_emits_node_and_present_fk_edges_only() {
    let mut projector = projector();
    let payload = br#"{
        "payload": {
            "op": "c",
            "after": {
                "id": 55,
                "name": "Acme",
                "operator_user_id": 7,
                "business_type_id": 3,
                "business_category_id": null,
                "business_phase_id": 2
            },
            "source": { "table": "businesses" }
        }
    }"#;

    let disposition = projector
        .apply("tia_server.dev_tia_db.businesses", payload)
        .await;
    assert!(matches!(disposition, Disposition::Applied(4)));

    let executed = projector.writer().executed();
    assert!(executed[0].template.starts_with("MERGE (n:Business {id: $id})"));
    assert!(executed[1].template.contains("[:OPERATES]"));
    assert!(executed[2].template.contains("[:IS_TYPE]"));
    assert!(executed[3].template.contains("[:IN_PHASE]"));
    assert!(!executed.iter().any(|m| m.template.contains("[:IN_CATEGORY]")));

    // The operator edge points from the user to the business.
    assert!(executed[1].template.starts_with("MATCH (a:User {id: $from_id})"));
    assert_eq!(scalar(executed[1].param("from_id").unwrap()), &Scalar::Integer(7));
    assert_eq!(scalar(executed[1].param("to_id").unwrap()), &Scalar::Integer(55));
}

#[tokio::test]
async fn tombstone_advances_without_mutations() {
    let mut projector = projector();
    let disposition = projector.apply("tia_server.dev_tia_db.users", b"").await;
    assert!(matches!(disposition, Disposition::Skipped(_)));
    assert!(projector.writer().executed().is_empty());
}

#[tokio::test]
async fn subscription_edge_carries_its_payload_columns() {
    let mut projector = projector();
    let payload = br#"{
        "payload": {
            "op": "c",
            "after": {
                "user_id": 1,
                "subscription_id": 2,
                "date_from": "2024-01-01",
                "date_to": null,
                "price": 9.5,
                "total": 11.4,
                "tax_amount": 1.9,
                "tax_rate": 20,
                "trial_from": null,
                "trial_to": null
            },
            "source": { "table": "user_subscriptions" }
        }
    }"#;

    let disposition = projector
        .apply("tia_server.dev_tia_db.user_subscriptions", payload)
        .await;
    assert!(matches!(disposition, Disposition::Applied(1)));

    let executed = projector.writer().executed();
    assert!(executed[0]
        .template
        .contains("MERGE (a)-[r:HAS_SUBSCRIPTION]->(b) SET r += $props"));
    let Some(ParamValue::Props(props)) = executed[0].param("props") else {
        panic!("expected props param");
    };
    let keys: Vec<&str> = props.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(keys, vec!["date_from", "price", "total", "tax_amount", "tax_rate"]);
}

#[tokio::test]
async fn business_connection_composite_is_ordered_node_first() {
    let mut projector = projector();
    let payload = br#"{
        "payload": {
            "op": "c",
            "after": {
                "id": 9,
                "initiator_business_id": 20,
                "receiver_business_id": 30,
                "connection_type_id": 4
            },
            "source": { "table": "business_connections" }
        }
    }"#;

    let disposition = projector
        .apply("tia_server.dev_tia_db.business_connections", payload)
        .await;
    assert!(matches!(disposition, Disposition::Applied(4)));

    let executed = projector.writer().executed();
    assert!(executed[0]
        .template
        .starts_with("MERGE (n:BusinessConnection {id: $id})"));
    assert!(executed[1].template.contains("[:INITIATED_CONNECTION]"));
    assert!(executed[2].template.contains("[:RECEIVED_BY]"));
    assert!(executed[3].template.contains("[:HAS_TYPE]"));
}

#[tokio::test]
async fn snapshot_reads_project_like_creates() {
    let mut projector = projector();
    let payload = br#"{
        "payload": {
            "op": "r",
            "after": { "id": 3, "name": "north" },
            "source": { "table": "regions" }
        }
    }"#;

    let disposition = projector.apply("tia_server.dev_tia_db.regions", payload).await;
    assert!(matches!(disposition, Disposition::Applied(1)));
    assert!(projector.writer().executed()[0]
        .template
        .starts_with("MERGE (n:Region {id: $id})"));
}
