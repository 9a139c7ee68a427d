use super::*;
use crate::error::ErrorKind;
use chrono::Duration;
use serde_json::json;

fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2024-02-11T13:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

#[test]
fn test_new_id_has_kind_prefix_and_is_unique() {
    let a = new_id(EntityKind::Secret);
    let b = new_id(EntityKind::Secret);
    assert!(a.starts_with("sec_"));
    assert!(new_id(EntityKind::CustomClass).starts_with("cls_"));
    assert_ne!(a, b);
    // v7 ids sort in creation order
    assert!(a < b);
}

#[test]
fn test_entity_kind_round_trips_through_wire_name() {
    for kind in EntityKind::ALL {
        assert_eq!(kind.as_str().parse::<EntityKind>().unwrap(), kind);
    }
    assert!("planet".parse::<EntityKind>().is_err());
}

#[test]
fn test_secret_from_draft_sets_equal_timestamps() {
    let draft = SecretDraft {
        name: "  OpenAI ".to_string(),
        key: "OPENAI_KEY".to_string(),
        value: "sk-...".to_string(),
        description: Some("   ".to_string()),
    };
    let secret = Secret::from_draft("sec_1".to_string(), draft, t0()).unwrap();

    assert_eq!(secret.name, "OpenAI");
    assert_eq!(secret.created_at, secret.updated_at);
    assert_eq!(secret.description, None);
}

#[test]
fn test_secret_rejects_bad_keys() {
    for key in ["", "openai_key", "1KEY", "OPEN-AI"] {
        let draft = SecretDraft {
            name: "x".to_string(),
            key: key.to_string(),
            ..Default::default()
        };
        let err = Secret::from_draft("sec_1".to_string(), draft, t0()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "key {:?}", key);
    }
}

#[test]
fn test_missing_name_is_validation_error() {
    let draft: BuildingDraft = serde_json::from_value(json!({})).unwrap();
    let err = Building::from_draft("bld_1".to_string(), draft, t0()).unwrap_err();
    assert_eq!(err, ServiceError::validation("name is required"));
}

#[test]
fn test_touch_never_moves_backwards() {
    let draft = AgentDraft {
        name: "Scout".to_string(),
        class: "scout".to_string(),
        ..Default::default()
    };
    let mut agent = Agent::from_draft("agt_1".to_string(), draft, t0()).unwrap();

    agent.touch(t0() - Duration::seconds(10));
    assert_eq!(agent.updated_at, t0() + Duration::microseconds(1));

    // Same clock reading still yields a newer version
    agent.touch(t0());
    assert_eq!(agent.updated_at, t0() + Duration::microseconds(2));

    agent.touch(t0() + Duration::seconds(10));
    assert_eq!(agent.updated_at, t0() + Duration::seconds(10));
    assert_eq!(agent.created_at, t0());
}

#[test]
fn test_owns_id_checks_prefix() {
    assert!(EntityKind::CustomClass.owns_id("cls_0190abcd"));
    assert!(!EntityKind::CustomClass.owns_id("scout"));
    assert!(!EntityKind::CustomClass.owns_id("clsx_1"));
    assert!(!EntityKind::Building.owns_id("cls_1"));
}

#[test]
fn test_patch_null_clears_absent_keeps() {
    let draft = AgentDraft {
        name: "Scout".to_string(),
        class: "scout".to_string(),
        building_id: Some("bld_1".to_string()),
        cwd: Some("/srv".to_string()),
        ..Default::default()
    };
    let mut agent = Agent::from_draft("agt_1".to_string(), draft, t0()).unwrap();

    let patch: AgentPatch = serde_json::from_value(json!({"buildingId": null})).unwrap();
    agent.apply_patch(patch).unwrap();

    assert_eq!(agent.building_id, None);
    assert_eq!(agent.cwd.as_deref(), Some("/srv"));
}

#[test]
fn test_patch_serializes_only_present_fields() {
    let patch = SecretPatch {
        value: Some("B".to_string()),
        ..Default::default()
    };
    assert_eq!(serde_json::to_value(&patch).unwrap(), json!({"value": "B"}));
}

#[test]
fn test_skill_slug_derived_from_name() {
    let draft = SkillDraft {
        name: "Git Review: PRs!".to_string(),
        ..Default::default()
    };
    let skill = Skill::from_draft("skl_1".to_string(), draft, t0()).unwrap();
    assert_eq!(skill.slug, "git-review-prs");
    assert!(skill.enabled);
}

#[test]
fn test_skill_rejects_invalid_slug() {
    let mut skill = Skill::from_draft(
        "skl_1".to_string(),
        SkillDraft {
            name: "Deploy".to_string(),
            ..Default::default()
        },
        t0(),
    )
    .unwrap();

    let err = skill
        .apply_patch(SkillPatch {
            slug: Some("Bad Slug".to_string()),
            ..Default::default()
        })
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(skill.slug, "deploy");
}

#[test]
fn test_building_wire_shape_is_camel_case() {
    let draft: BuildingDraft = serde_json::from_value(json!({
        "name": "API",
        "buildingType": "docker",
        "commands": {"start": "docker start api", "healthCheck": "curl -f localhost"}
    }))
    .unwrap();
    let building = Building::from_draft("bld_1".to_string(), draft, t0()).unwrap();
    let value = serde_json::to_value(&building).unwrap();

    assert_eq!(value["buildingType"], "docker");
    assert_eq!(value["status"], "unknown");
    assert_eq!(value["commands"]["healthCheck"], "curl -f localhost");
    assert!(value.get("createdAt").is_some());
    assert!(value.get("lastCommandOutput").is_none());
}

#[test]
fn test_building_command_transitions() {
    use BuildingStatus::*;

    assert!(BuildingCommand::Start.allowed_from(Stopped));
    assert!(!BuildingCommand::Start.allowed_from(Running));
    assert!(!BuildingCommand::Stop.allowed_from(Stopped));
    assert!(!BuildingCommand::HealthCheck.allowed_from(Stopped));
    assert!(BuildingCommand::Logs.allowed_from(Stopping));

    assert_eq!(BuildingCommand::Start.settle(Stopped, true), Running);
    assert_eq!(BuildingCommand::Stop.settle(Running, true), Stopped);
    assert_eq!(BuildingCommand::Restart.settle(Running, false), Error);
    assert_eq!(BuildingCommand::Logs.settle(Running, false), Running);
}

#[test]
fn test_building_commands_ignore_blank_scripts() {
    let commands = BuildingCommands {
        start: Some("  ".to_string()),
        stop: Some(" pm2 stop api ".to_string()),
        ..Default::default()
    };
    assert_eq!(commands.script(BuildingCommand::Start), None);
    assert_eq!(commands.script(BuildingCommand::Stop), Some("pm2 stop api"));
}

#[test]
fn test_custom_class_dedups_default_skills() {
    let draft = CustomClassDraft {
        name: "Reviewer".to_string(),
        default_skill_ids: vec![
            "skl_1".to_string(),
            " skl_1".to_string(),
            "".to_string(),
            "skl_2".to_string(),
        ],
        ..Default::default()
    };
    let class = CustomClass::from_draft("cls_1".to_string(), draft, t0()).unwrap();
    assert_eq!(class.default_skill_ids, vec!["skl_1", "skl_2"]);
}
