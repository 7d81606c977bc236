// Copyright 2025 Cowboy AI, LLC.

//! Schema registry: table → projection rule
//!
//! The registry is the declarative heart of the synchronizer. It is built
//! once at startup and maps every upstream table this service knows about
//! to exactly one [`TableRule`]. Tables absent from the registry are
//! dropped by the consumption loop.
//!
//! Rule kinds:
//!
//! - **Node**: the row becomes a labelled node keyed by `id`
//! - **NodeWithEdges**: a node plus foreign-key edges anchored on it
//! - **PropertyMerge**: the row folds properties onto an existing node
//! - **Edge**: a join-table row becomes a relationship
//! - **EdgeWithProps**: a relationship carrying payload columns
//! - **Composite**: elementary rules executed in order within one event

use std::collections::{BTreeSet, HashMap};

use crate::labels::LabelCache;

/// Which side of a foreign-key edge the event's own node sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Edge points from the event's node to the FK target
    Outbound,
    /// Edge points from the FK target to the event's node
    Inbound,
}

/// A foreign-key edge anchored on the node a [`TableRule::NodeWithEdges`] owns
#[derive(Debug, Clone)]
pub struct OwnedEdge {
    /// Column carrying the foreign key
    pub fk_column: String,
    /// Label of the node on the other end
    pub peer_label: String,
    /// Relationship type
    pub rel_type: String,
    /// Which way the edge points
    pub direction: Direction,
    /// Suppress silently when the FK column is absent or null
    pub optional: bool,
}

/// A relationship between two nodes, both identified by row columns
#[derive(Debug, Clone)]
pub struct EdgeRule {
    /// Label of the source node
    pub from_label: String,
    /// Column holding the source node's id
    pub from_column: String,
    /// Label of the target node
    pub to_label: String,
    /// Column holding the target node's id
    pub to_column: String,
    /// Relationship type
    pub rel_type: String,
    /// Suppress silently when an endpoint column is absent or null
    pub optional: bool,
}

/// Projection rule for one upstream table
#[derive(Debug, Clone)]
pub enum TableRule {
    /// Row becomes a node
    Node {
        /// Node label
        label: String,
        /// Primary-key column
        id_column: String,
    },
    /// Row becomes a node plus foreign-key edges
    NodeWithEdges {
        /// Node label
        label: String,
        /// Primary-key column
        id_column: String,
        /// Edges anchored on this node
        edges: Vec<OwnedEdge>,
    },
    /// Row folds properties onto an existing node, one-to-one
    PropertyMerge {
        /// Target node label
        label: String,
        /// Column identifying the target node
        id_column: String,
        /// source column → target property name
        properties: Vec<(String, String)>,
    },
    /// Join-table row becomes a relationship
    Edge(EdgeRule),
    /// Relationship carrying payload columns
    EdgeWithProps {
        /// The relationship itself
        edge: EdgeRule,
        /// Columns stored as relationship properties
        columns: Vec<String>,
    },
    /// Elementary rules executed in order within the same event
    Composite(Vec<TableRule>),
}

fn edge(
    from_label: &str,
    from_column: &str,
    to_label: &str,
    to_column: &str,
    rel_type: &str,
) -> EdgeRule {
    EdgeRule {
        from_label: from_label.to_string(),
        from_column: from_column.to_string(),
        to_label: to_label.to_string(),
        to_column: to_column.to_string(),
        rel_type: rel_type.to_string(),
        optional: false,
    }
}

fn owned_edge(
    fk_column: &str,
    peer_label: &str,
    rel_type: &str,
    direction: Direction,
    optional: bool,
) -> OwnedEdge {
    OwnedEdge {
        fk_column: fk_column.to_string(),
        peer_label: peer_label.to_string(),
        rel_type: rel_type.to_string(),
        direction,
        optional,
    }
}

/// Static mapping from table names to projection rules
#[derive(Debug)]
pub struct SchemaRegistry {
    rules: HashMap<String, TableRule>,
}

impl SchemaRegistry {
    /// Build the registry for the upstream schema this service projects
    pub fn standard() -> Self {
        let mut labels = LabelCache::new();
        let mut rules = HashMap::new();

        // Entity tables that become plain nodes.
        let node_tables = [
            "users",
            "regions",
            "subscriptions",
            "skill_categories",
            "strength_categories",
            "business_categories",
            "industry_categories",
            "business_types",
            "business_phases",
            "business_roles",
            "business_skills",
            "business_strengths",
            "connection_types",
            "mastermind_roles",
            "daily_activities",
        ];
        for table in node_tables {
            rules.insert(
                table.to_string(),
                TableRule::Node {
                    label: labels.get(table).to_string(),
                    id_column: "id".to_string(),
                },
            );
        }

        // Entities whose rows also carry foreign keys worth projecting.
        rules.insert(
            "projects".to_string(),
            TableRule::NodeWithEdges {
                label: labels.get("projects").to_string(),
                id_column: "id".to_string(),
                edges: vec![owned_edge(
                    "managed_by_user_id",
                    "User",
                    "MANAGES",
                    Direction::Inbound,
                    true,
                )],
            },
        );
        // Not normalised: naive singularisation would keep the trailing 'e'
        // and the edge rules below all reference Business.
        rules.insert(
            "businesses".to_string(),
            TableRule::NodeWithEdges {
                label: "Business".to_string(),
                id_column: "id".to_string(),
                edges: vec![
                    owned_edge("operator_user_id", "User", "OPERATES", Direction::Inbound, true),
                    owned_edge(
                        "business_type_id",
                        "BusinessType",
                        "IS_TYPE",
                        Direction::Outbound,
                        true,
                    ),
                    owned_edge(
                        "business_category_id",
                        "BusinessCategory",
                        "IN_CATEGORY",
                        Direction::Outbound,
                        true,
                    ),
                    owned_edge(
                        "business_phase_id",
                        "BusinessPhase",
                        "IN_PHASE",
                        Direction::Outbound,
                        true,
                    ),
                ],
            },
        );
        for (table, parent_label) in [
            ("skills", "SkillCategory"),
            ("strengths", "StrengthCategory"),
            ("industries", "IndustryCategory"),
        ] {
            rules.insert(
                table.to_string(),
                TableRule::NodeWithEdges {
                    label: labels.get(table).to_string(),
                    id_column: "id".to_string(),
                    edges: vec![owned_edge(
                        "category_id",
                        parent_label,
                        "IN_CATEGORY",
                        Direction::Outbound,
                        true,
                    )],
                },
            );
        }
        rules.insert(
            "ideas".to_string(),
            TableRule::NodeWithEdges {
                label: labels.get("ideas").to_string(),
                id_column: "id".to_string(),
                edges: vec![owned_edge(
                    "submitted_by_user_id",
                    "User",
                    "SUBMITTED",
                    Direction::Inbound,
                    false,
                )],
            },
        );
        rules.insert(
            "user_posts".to_string(),
            TableRule::NodeWithEdges {
                label: labels.get("user_posts").to_string(),
                id_column: "id".to_string(),
                edges: vec![owned_edge(
                    "poster_user_id",
                    "User",
                    "CREATED",
                    Direction::Inbound,
                    false,
                )],
            },
        );
        rules.insert(
            "case_studies".to_string(),
            TableRule::NodeWithEdges {
                label: labels.get("case_studies").to_string(),
                id_column: "id".to_string(),
                edges: vec![owned_edge(
                    "owner_user_id",
                    "User",
                    "OWNS",
                    Direction::Inbound,
                    false,
                )],
            },
        );
        rules.insert(
            "notifications".to_string(),
            TableRule::NodeWithEdges {
                label: labels.get("notifications").to_string(),
                id_column: "id".to_string(),
                edges: vec![
                    owned_edge("sender_user_id", "User", "SENT", Direction::Inbound, false),
                    owned_edge(
                        "receiver_user_id",
                        "User",
                        "RECEIVED_BY",
                        Direction::Outbound,
                        false,
                    ),
                ],
            },
        );

        // One-to-one table folded onto its owner.
        rules.insert(
            "user_logins".to_string(),
            TableRule::PropertyMerge {
                label: "User".to_string(),
                id_column: "user_id".to_string(),
                properties: vec![("login_email".to_string(), "loginEmail".to_string())],
            },
        );

        // Business connections: a node of their own, wired to both businesses
        // and to the connection type. The node must be written before its
        // edges because the edges' endpoint is this same event's node.
        rules.insert(
            "business_connections".to_string(),
            TableRule::Composite(vec![
                TableRule::Node {
                    label: labels.get("business_connections").to_string(),
                    id_column: "id".to_string(),
                },
                TableRule::Edge(edge(
                    "Business",
                    "initiator_business_id",
                    "BusinessConnection",
                    "id",
                    "INITIATED_CONNECTION",
                )),
                TableRule::Edge(edge(
                    "BusinessConnection",
                    "id",
                    "Business",
                    "receiver_business_id",
                    "RECEIVED_BY",
                )),
                TableRule::Edge(EdgeRule {
                    optional: true,
                    ..edge(
                        "BusinessConnection",
                        "id",
                        "ConnectionType",
                        "connection_type_id",
                        "HAS_TYPE",
                    )
                }),
            ]),
        );

        // Join tables that become relationships.
        let edge_tables = [
            ("project_regions", edge("Project", "project_id", "Region", "region_id", "IN_REGION")),
            ("user_skills", edge("User", "user_id", "Skill", "skill_id", "HAS_SKILL")),
            (
                "user_strengths",
                edge("User", "user_id", "Strength", "strength_id", "HAS_STRENGTH"),
            ),
            (
                "project_business_skills",
                edge(
                    "Project",
                    "project_id",
                    "BusinessSkill",
                    "business_skill_id",
                    "REQUIRES_SKILL",
                ),
            ),
            (
                "project_business_categories",
                edge(
                    "Project",
                    "project_id",
                    "BusinessCategory",
                    "business_category_id",
                    "IN_CATEGORY",
                ),
            ),
            (
                "daily_activity_enrolments",
                edge(
                    "User",
                    "user_id",
                    "DailyActivity",
                    "daily_activity_id",
                    "ENROLLED_IN",
                ),
            ),
            (
                "user_business_strengths",
                edge(
                    "User",
                    "user_id",
                    "BusinessStrength",
                    "business_strength_id",
                    "HAS_BUSINESS_STRENGTH",
                ),
            ),
            (
                "connection_mastermind_roles",
                edge(
                    "BusinessConnection",
                    "connection_id",
                    "MastermindRole",
                    "mastermind_role_id",
                    "HAS_MASTERMIND_ROLE",
                ),
            ),
        ];
        for (table, rule) in edge_tables {
            rules.insert(table.to_string(), TableRule::Edge(rule));
        }

        // Relationships that keep payload columns on the edge.
        rules.insert(
            "idea_votes".to_string(),
            TableRule::EdgeWithProps {
                edge: edge("User", "voter_user_id", "Idea", "idea_id", "VOTED_ON"),
                columns: vec!["type".to_string()],
            },
        );
        rules.insert(
            "user_subscriptions".to_string(),
            TableRule::EdgeWithProps {
                edge: edge(
                    "User",
                    "user_id",
                    "Subscription",
                    "subscription_id",
                    "HAS_SUBSCRIPTION",
                ),
                columns: [
                    "date_from",
                    "date_to",
                    "price",
                    "total",
                    "tax_amount",
                    "tax_rate",
                    "trial_from",
                    "trial_to",
                ]
                .into_iter()
                .map(String::from)
                .collect(),
            },
        );
        rules.insert(
            "user_daily_activity_progress".to_string(),
            TableRule::EdgeWithProps {
                edge: edge(
                    "User",
                    "user_id",
                    "DailyActivity",
                    "daily_activity_id",
                    "HAS_PROGRESS_IN",
                ),
                columns: vec!["progress".to_string(), "date".to_string()],
            },
        );

        Self { rules }
    }

    /// Look up the rule for a table; `None` means the table is not projected
    pub fn lookup(&self, table: &str) -> Option<&TableRule> {
        self.rules.get(table)
    }

    /// All tables the registry declares
    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.rules.keys().map(String::as_str)
    }

    /// Labels of every node kind the registry can create
    pub fn node_labels(&self) -> BTreeSet<String> {
        fn collect(rule: &TableRule, labels: &mut BTreeSet<String>) {
            match rule {
                TableRule::Node { label, .. } | TableRule::NodeWithEdges { label, .. } => {
                    labels.insert(label.clone());
                }
                TableRule::Composite(rules) => {
                    for rule in rules {
                        collect(rule, labels);
                    }
                }
                TableRule::PropertyMerge { .. }
                | TableRule::Edge(_)
                | TableRule::EdgeWithProps { .. } => {}
            }
        }

        let mut labels = BTreeSet::new();
        for rule in self.rules.values() {
            collect(rule, &mut labels);
        }
        labels
    }

    /// Uniqueness constraints for every node label, for startup initialization
    pub fn constraint_statements(&self) -> Vec<String> {
        self.node_labels()
            .into_iter()
            .map(|label| {
                format!("CREATE CONSTRAINT IF NOT EXISTS FOR (n:{label}) REQUIRE n.id IS UNIQUE")
            })
            .collect()
    }
}
