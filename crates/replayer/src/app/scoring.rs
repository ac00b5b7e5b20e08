use std::collections::BTreeSet;

use replay_engine::{format_time, ActionRecord, ReplayWorld, Role, Scorer};

const HEADER_COLUMNS: [&str; 13] = [
    "transaction_id",
    "user_id",
    "session_id",
    "level_name",
    "attempt",
    "time",
    "selection",
    "action",
    "state_entities",
    "action_entities",
    "start_state_entities",
    "moving_bodies",
    "touching_pairs",
];

/// Scores each settled step by tallying what the world holds: entities per
/// role, bodies still in motion and distinct touching pairs.
#[derive(Debug, Default)]
pub(crate) struct TallyScorer {
    steps: u64,
    current: Option<Vec<String>>,
}

impl TallyScorer {
    pub(crate) fn new() -> Self {
        Self::default()
    }
}

impl Scorer for TallyScorer {
    fn header_line(&self) -> String {
        HEADER_COLUMNS.join(",")
    }

    fn footer_line(&self) -> String {
        format!("# steps={}", self.steps)
    }

    fn reset_scores(&mut self) {
        self.current = None;
    }

    fn calculate_scores(&mut self, record: &ActionRecord, world: &ReplayWorld) {
        let registry = world.registry();
        let live = world
            .entities()
            .iter()
            .filter(|entity| registry.contains(entity.id));

        let mut moving_bodies = 0usize;
        let mut pairs = BTreeSet::new();
        for entity in live {
            if !entity.is_at_rest() {
                moving_bodies += 1;
            }
            for other in entity.touching() {
                if registry.contains(other) {
                    pairs.insert((entity.id.min(other), entity.id.max(other)));
                }
            }
        }

        let time = if record.has_valid_timestamp() {
            format_time(record.timestamp())
        } else {
            String::new()
        };

        self.steps += 1;
        self.current = Some(vec![
            record.transaction_id().to_string(),
            record.user_id().to_string(),
            record.session_id().to_string(),
            record.level_name().to_string(),
            record.attempt_number().to_string(),
            time,
            record.selection().to_string(),
            record.action().to_string(),
            registry.count_with_role(Role::State).to_string(),
            registry.count_with_role(Role::Action).to_string(),
            registry.count_with_role(Role::StartState).to_string(),
            moving_bodies.to_string(),
            pairs.len().to_string(),
        ]);
    }

    fn current_line(&self) -> String {
        self.current
            .as_ref()
            .map(|fields| {
                fields
                    .iter()
                    .map(|field| csv_field(field))
                    .collect::<Vec<_>>()
                    .join(",")
            })
            .unwrap_or_default()
    }

    fn capture_name(&self) -> String {
        let transaction = self
            .current
            .as_ref()
            .and_then(|fields| fields.first())
            .map(String::as_str)
            .unwrap_or_default();
        format!("{:05}_{}", self.steps, sanitize_file_stem(transaction))
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn sanitize_file_stem(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "step".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use replay_engine::{
        BodyKind, BodyMotion, ContactEvent, EntityId, EntitySpawn, PhysicalBody, RawActionFields,
        Transform, Vec2,
    };

    fn record(transaction: &str, selection: &str) -> ActionRecord {
        ActionRecord::from_fields(RawActionFields {
            selection: selection.to_string(),
            action: "Drop".to_string(),
            time: "2020-01-02 03:04:05.006".to_string(),
            user_id: "u7".to_string(),
            session_id: "s1".to_string(),
            transaction_id: transaction.to_string(),
            level_name: "Ramp".to_string(),
            attempt_number: "3".to_string(),
            ..RawActionFields::default()
        })
    }

    fn spawn(world: &mut ReplayWorld, name: &str, role: Role, moving: bool) -> EntityId {
        let motion = if moving {
            BodyMotion {
                velocity: Vec2::new(0.0, -2.0),
                angular_velocity: 0.0,
            }
        } else {
            BodyMotion::at_rest()
        };
        world.spawn(EntitySpawn {
            name: name.to_string(),
            template_key: name.to_string(),
            template_tag: name.to_string(),
            world_tag: "Table".to_string(),
            extra_tags: Vec::new(),
            transform: Transform::default(),
            body: Some(PhysicalBody {
                kind: BodyKind::Dynamic,
                motion,
            }),
            role,
        })
    }

    #[test]
    fn header_has_one_column_per_field() {
        let scorer = TallyScorer::new();
        let header = scorer.header_line();
        assert!(header.starts_with("transaction_id,user_id"));
        assert_eq!(header.split(',').count(), HEADER_COLUMNS.len());
        assert_eq!(scorer.current_line(), "");
        assert_eq!(scorer.footer_line(), "# steps=0");
    }

    #[test]
    fn tallies_roles_motion_and_contacts() {
        let mut world = ReplayWorld::new();
        let a = spawn(&mut world, "A", Role::State, false);
        let b = spawn(&mut world, "B", Role::State, true);
        spawn(&mut world, "Held", Role::Action, false);
        let floor = spawn(&mut world, "Floor", Role::StartState, false);
        world.apply_contact(ContactEvent::Enter { a, b: floor });
        world.apply_contact(ContactEvent::Enter { a: b, b: floor });
        world.apply_contact(ContactEvent::Stay { a, b: floor });

        let mut scorer = TallyScorer::new();
        scorer.calculate_scores(&record("t9", "B"), &world);

        assert_eq!(
            scorer.current_line(),
            "t9,u7,s1,Ramp,3,2020-01-02 03:04:05.006,B,Drop,2,1,1,1,2"
        );
        assert_eq!(scorer.footer_line(), "# steps=1");

        scorer.reset_scores();
        assert_eq!(scorer.current_line(), "");
        assert_eq!(scorer.footer_line(), "# steps=1");
    }

    #[test]
    fn quotes_fields_that_need_it() {
        let world = ReplayWorld::new();
        let mut scorer = TallyScorer::new();
        scorer.calculate_scores(&record("t1", "Box, \"big\""), &world);
        let line = scorer.current_line();
        assert!(line.contains(",\"Box, \"\"big\"\"\",Drop,"), "{line}");
    }

    #[test]
    fn capture_names_are_ordered_and_file_safe() {
        let world = ReplayWorld::new();
        let mut scorer = TallyScorer::new();
        scorer.calculate_scores(&record("tx/1:a", "Box"), &world);
        assert_eq!(scorer.capture_name(), "00001_tx_1_a");
        scorer.reset_scores();
        scorer.calculate_scores(&record("", "Box"), &world);
        assert_eq!(scorer.capture_name(), "00002_step");
    }

    #[test]
    fn unparseable_time_leaves_column_empty() {
        let world = ReplayWorld::new();
        let mut scorer = TallyScorer::new();
        let record = ActionRecord::from_fields(RawActionFields {
            transaction_id: "t1".to_string(),
            time: "yesterday".to_string(),
            attempt_number: "1".to_string(),
            ..RawActionFields::default()
        });
        scorer.calculate_scores(&record, &world);
        let fields: Vec<String> = scorer
            .current_line()
            .split(',')
            .map(str::to_string)
            .collect();
        assert_eq!(fields[5], "");
    }
}
