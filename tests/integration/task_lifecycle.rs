//! Snooze, badge and drawer behaviour over a file-backed store.

use crate::helpers::{HOUR, NOW, app_on, config_for, temp_app};
use davetjet::{ActionEffect, SnoozePreset, TaskAction, TaskStatus};

#[test]
fn drawer_for_fresh_user() {
    let t = temp_app(None);
    let engine = t.app.tasks().unwrap();

    let wizard = engine.drawer("wizard");
    let ids: Vec<&str> = wizard.cards.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, ["wiz_template", "wiz_info", "create_invitation"]);
    assert_eq!(wizard.percent, 0);
    assert_eq!(wizard.badge_count, 3);
}

#[test]
fn snoozed_task_returns_when_due_and_persists() {
    let t = temp_app(None);
    {
        let mut engine = t.app.tasks().unwrap();
        let effect = engine
            .dispatch("create_invitation", TaskAction::Snooze(SnoozePreset::OneHour))
            .unwrap();
        assert_eq!(effect, ActionEffect::Refresh);
        assert_eq!(
            engine.status("create_invitation"),
            Some(TaskStatus::Snoozed { until: NOW + HOUR })
        );
    }

    // A second process sees the snooze, and it lapses on time.
    let restarted = app_on(t.dir.path(), config_for(None), &t.clock, &t.notices);
    assert!(matches!(
        restarted.tasks().unwrap().status("create_invitation"),
        Some(TaskStatus::Snoozed { .. })
    ));
    t.clock.advance(HOUR);
    assert_eq!(
        restarted.tasks().unwrap().status("create_invitation"),
        Some(TaskStatus::Visible)
    );
}

#[test]
fn badge_pulses_at_most_hourly() {
    let t = temp_app(None);
    let mut engine = t.app.tasks().unwrap();

    let first = engine.refresh_badge().unwrap();
    assert_eq!((first.count, first.pulse), (3, true));
    assert!(!engine.refresh_badge().unwrap().pulse);

    t.clock.advance(HOUR + 1);
    assert!(engine.refresh_badge().unwrap().pulse);
}

#[test]
fn redirect_action_navigates_to_configured_link() {
    let mut config = config_for(None);
    config.tasks.send_url = "/send-now".into();
    let t = temp_app(None);
    let app = app_on(t.dir.path(), config, &t.clock, &t.notices);

    let effect = app
        .tasks()
        .unwrap()
        .dispatch("sending_setup", TaskAction::Redirect)
        .unwrap();
    assert_eq!(
        effect,
        ActionEffect::Navigate {
            href: "/send-now".into()
        }
    );
}

#[test]
fn unknown_task_is_rejected() {
    let t = temp_app(None);
    assert!(t.app.tasks().unwrap().complete("tea_break").is_err());
}
