//! Tours completing their page's tasks through the bus.

use crate::helpers::temp_app;
use davetjet::{Placement, TaskStatus, TourPhase, TourStep};

fn wizard_steps() -> Vec<TourStep> {
    vec![
        TourStep::new("tpl-grid", "Templates", "Pick a design").scoped("wizard"),
        TourStep::new("info-form", "Details", "Title, date and place")
            .scoped("wizard")
            .placed(Placement::Right),
        TourStep::new("filters", "Filters", "Slice the numbers").scoped("analytics"),
    ]
}

#[test]
fn finished_tour_completes_wizard_tasks() {
    let t = temp_app(None);
    let mut tour = t.app.tour("wizard", &wizard_steps());
    assert_eq!(tour.steps().len(), 2);

    assert!(tour.auto_start_once());
    tour.next().unwrap();
    tour.next().unwrap();
    assert_eq!(tour.phase(), TourPhase::Finished);

    let engine = t.app.tasks().unwrap();
    assert_eq!(engine.status("wiz_template"), Some(TaskStatus::Done));
    assert_eq!(engine.status("wiz_info"), Some(TaskStatus::Done));
    assert_eq!(engine.status("analytics_view"), Some(TaskStatus::Hidden));
    drop(engine);

    // Seen now: a fresh tour for the page does not auto-start.
    let mut again = t.app.tour("wizard", &wizard_steps());
    assert!(!again.auto_start_once());
}

#[test]
fn skipped_tour_leaves_tasks_open() {
    let t = temp_app(None);
    let mut tour = t.app.tour("wizard", &wizard_steps());
    tour.start(0);
    tour.end(true).unwrap();

    let engine = t.app.tasks().unwrap();
    assert_eq!(engine.status("wiz_template"), Some(TaskStatus::Visible));
    drop(engine);
    assert!(t.app.tour("wizard", &wizard_steps()).auto_start_once());
}

#[test]
fn pageless_tour_end_refers_to_page_of_last_tour() {
    let t = temp_app(None);
    let _tour = t.app.tour("wizard", &wizard_steps());

    t.app
        .bus()
        .emit(davetjet_transport::topics::TOUR_ENDED, &serde_json::json!({ "skipped": false }));

    assert_eq!(
        t.app.tasks().unwrap().status("wiz_info"),
        Some(TaskStatus::Done)
    );
}
