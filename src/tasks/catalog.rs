//! Static task catalog and its dependency graph.

use crate::config::TaskSettings;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;

/// Catalog construction or lookup failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("duplicate task id `{0}`")]
    DuplicateId(String),

    #[error("task `{task}` requires unknown task `{requires}`")]
    UnknownPrerequisite { task: String, requires: String },

    /// The prerequisite graph has a cycle through these ids.
    #[error("prerequisite cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),

    #[error("unknown task `{0}`")]
    UnknownTask(String),
}

/// What starting a task does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskKind {
    /// Runs the page tour starting at the step anchored at `tour_key`.
    Tour { tour_key: String },
    /// Navigates to `href`.
    Redirect { href: String },
}

/// One catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    /// Page this task belongs to; `None` shows it on every page.
    pub page: Option<String>,
    pub kind: TaskKind,
    pub critical: bool,
    pub recommended: bool,
    /// Tasks that must be done before this one becomes visible.
    pub requires: Vec<String>,
}

impl Task {
    pub fn tour(id: &str, title: &str, description: &str, page: &str, tour_key: &str) -> Self {
        Self {
            id: id.to_owned(),
            title: title.to_owned(),
            description: description.to_owned(),
            page: Some(page.to_owned()),
            kind: TaskKind::Tour {
                tour_key: tour_key.to_owned(),
            },
            critical: false,
            recommended: false,
            requires: Vec::new(),
        }
    }

    pub fn redirect(id: &str, title: &str, description: &str, href: &str) -> Self {
        Self {
            id: id.to_owned(),
            title: title.to_owned(),
            description: description.to_owned(),
            page: None,
            kind: TaskKind::Redirect {
                href: href.to_owned(),
            },
            critical: false,
            recommended: false,
            requires: Vec::new(),
        }
    }

    #[must_use]
    pub fn critical(mut self) -> Self {
        self.critical = true;
        self
    }

    #[must_use]
    pub fn recommended(mut self) -> Self {
        self.recommended = true;
        self
    }

    #[must_use]
    pub fn requires(mut self, id: &str) -> Self {
        self.requires.push(id.to_owned());
        self
    }

    pub fn is_tour(&self) -> bool {
        matches!(self.kind, TaskKind::Tour { .. })
    }

    /// Whether the task is listed on `page`.
    pub fn on_page(&self, page: &str) -> bool {
        self.page.as_deref().is_none_or(|p| p == page)
    }
}

/// Immutable, validated task list.
#[derive(Debug, Clone)]
pub struct Catalog {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl Catalog {
    /// Validate and index `tasks`. Declaration order is kept for display.
    ///
    /// # Errors
    ///
    /// Fails on duplicate ids, unknown prerequisites or a prerequisite cycle.
    pub fn new(tasks: Vec<Task>) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(tasks.len());
        for (i, task) in tasks.iter().enumerate() {
            if index.insert(task.id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId(task.id.clone()));
            }
        }
        for task in &tasks {
            if let Some(missing) = task.requires.iter().find(|r| !index.contains_key(*r)) {
                return Err(CatalogError::UnknownPrerequisite {
                    task: task.id.clone(),
                    requires: missing.clone(),
                });
            }
        }
        let catalog = Self { tasks, index };
        catalog.check_acyclic()?;
        Ok(catalog)
    }

    /// The built-in invitation onboarding catalog.
    ///
    /// # Errors
    ///
    /// Never fails for the built-in list; the result is kept for symmetry with
    /// [`Catalog::new`].
    pub fn builtin(links: &TaskSettings) -> Result<Self, CatalogError> {
        Self::new(vec![
            Task::tour(
                "wiz_template",
                "Pick a template",
                "Finish choosing a template in the wizard.",
                "wizard",
                "template",
            )
            .recommended(),
            Task::tour(
                "wiz_info",
                "Fill in the basics",
                "Complete the title, date/time and location fields.",
                "wizard",
                "basic-info",
            )
            .critical(),
            Task::redirect(
                "create_invitation",
                "Create a new invitation",
                "Use the wizard to create your first invitation.",
                &links.create_url,
            )
            .critical()
            .recommended(),
            Task::redirect(
                "sending_setup",
                "Send your invitation",
                "Pick email/SMS and schedule it.",
                &links.send_url,
            )
            .requires("create_invitation"),
            Task::redirect(
                "analytics_overview",
                "Analyse your invitation",
                "Review performance with RSVP, funnel and timeline.",
                &links.analytics_url,
            )
            .requires("create_invitation"),
            Task::tour(
                "analytics_view",
                "Use the analytics filters",
                "Look at summaries with invitation, channel and date filters.",
                "analytics",
                "filters",
            )
            .recommended()
            .requires("create_invitation"),
        ])
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.index.get(id).map(|&i| &self.tasks[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }

    /// Tasks listed on `page`, in declaration order.
    pub fn for_page<'a>(&'a self, page: &'a str) -> impl Iterator<Item = &'a Task> {
        self.tasks.iter().filter(move |t| t.on_page(page))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    fn check_acyclic(&self) -> Result<(), CatalogError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            New,
            Active,
            Finished,
        }

        fn visit(
            catalog: &Catalog,
            i: usize,
            marks: &mut [Mark],
            path: &mut Vec<String>,
        ) -> Result<(), CatalogError> {
            match marks[i] {
                Mark::Finished => return Ok(()),
                Mark::Active => {
                    let id = &catalog.tasks[i].id;
                    let start = path.iter().position(|p| p == id).unwrap_or(0);
                    let mut cycle = path[start..].to_vec();
                    cycle.push(id.clone());
                    return Err(CatalogError::Cycle(cycle));
                }
                Mark::New => {}
            }
            marks[i] = Mark::Active;
            path.push(catalog.tasks[i].id.clone());
            for dep in &catalog.tasks[i].requires {
                if let Some(&j) = catalog.index.get(dep) {
                    visit(catalog, j, marks, path)?;
                }
            }
            path.pop();
            marks[i] = Mark::Finished;
            Ok(())
        }

        let mut marks = vec![Mark::New; self.tasks.len()];
        let mut path = Vec::new();
        for i in 0..self.tasks.len() {
            visit(self, i, &mut marks, &mut path)?;
        }
        Ok(())
    }
}
