//! Project status dashboard.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{DefaultTerminal, Frame};
use tokio::runtime::Handle;
use tracing::info;
use vibeterm_core::Engine;
use vibeterm_core::git::{RemediationPlan, RemediationResult, RepositoryStatus};

const TICK: Duration = Duration::from_millis(250);

/// Open the dashboard over the configured projects.
pub async fn run_dashboard(engine: Arc<Engine>) -> Result<()> {
    let projects = engine.tracked_projects();
    if projects.is_empty() {
        bail!("no projects configured; add `projects:` to the config file");
    }

    let handle = Handle::current();
    tokio::task::spawn_blocking(move || {
        let mut terminal = ratatui::init();
        let mut app = App {
            engine,
            handle,
            state: DashboardState::new(projects),
            running: true,
        };
        let result = app.run(&mut terminal);
        ratatui::restore();
        result
    })
    .await
    .context("dashboard task panicked")?
}

/// Everything the dashboard renders.
#[derive(Debug, Default)]
pub struct DashboardState {
    projects: Vec<PathBuf>,
    statuses: BTreeMap<PathBuf, RepositoryStatus>,
    selected: usize,
    /// Fixable plans shown to the user, applied only by `f`.
    reviewed: BTreeMap<PathBuf, RemediationPlan>,
    detail_title: String,
    detail: Vec<String>,
}

impl DashboardState {
    pub fn new(projects: Vec<PathBuf>) -> Self {
        Self {
            projects,
            detail_title: "Details".to_owned(),
            ..Self::default()
        }
    }

    pub fn selected_project(&self) -> Option<&PathBuf> {
        self.projects.get(self.selected)
    }

    pub fn select_next(&mut self) {
        if !self.projects.is_empty() {
            self.selected = (self.selected + 1) % self.projects.len();
        }
    }

    pub fn select_previous(&mut self) {
        if !self.projects.is_empty() {
            self.selected = self
                .selected
                .checked_sub(1)
                .unwrap_or(self.projects.len() - 1);
        }
    }

    pub fn set_statuses(&mut self, statuses: BTreeMap<PathBuf, RepositoryStatus>) {
        self.statuses = statuses;
    }

    /// Display `plan` for `path` and remember it if it can be applied.
    pub fn show_plan(&mut self, path: &Path, plan: RemediationPlan) {
        self.detail_title = "Plan".to_owned();
        self.detail = plan.actions.iter().map(|a| format!("- {a}")).collect();
        if let Some(warning) = &plan.warning {
            self.detail.push(format!("warning: {warning}"));
        }
        if plan.can_fix {
            self.detail.push("press f to apply".to_owned());
            self.reviewed.insert(path.to_path_buf(), plan);
        } else {
            self.reviewed.remove(path);
        }
    }

    /// Remove and return the plan last shown for `path`.
    pub fn take_reviewed_plan(&mut self, path: &Path) -> Option<RemediationPlan> {
        self.reviewed.remove(path)
    }

    pub fn show_unreviewed(&mut self) {
        self.detail_title = "No plan".to_owned();
        self.detail = vec!["press p to review the plan first".to_owned()];
    }

    pub fn show_result(&mut self, result: &RemediationResult) {
        self.detail_title = if result.success {
            "Fix applied".to_owned()
        } else {
            "Fix failed".to_owned()
        };
        self.detail = result.output.lines().map(str::to_owned).collect();
        if let Some(error) = &result.error {
            self.detail.extend(error.lines().map(|l| format!("error: {l}")));
        }
    }

    pub fn draw(&self, frame: &mut Frame) {
        let [list_area, detail_area, help_area] = Layout::vertical([
            Constraint::Min(5),
            Constraint::Length(10),
            Constraint::Length(1),
        ])
        .areas(frame.area());

        let items: Vec<ListItem> = self
            .projects
            .iter()
            .map(|path| {
                let (label, style) = match self.statuses.get(path) {
                    Some(status) => (status.to_string(), status_style(status)),
                    None => ("…".to_owned(), Style::default().fg(Color::DarkGray)),
                };
                ListItem::new(Line::from(vec![
                    Span::styled(
                        format!("{:<24} ", project_name(path)),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::styled(label, style),
                ]))
            })
            .collect();
        let list = List::new(items)
            .block(Block::default().title(" Projects ").borders(Borders::ALL))
            .highlight_style(Style::default().bg(Color::Rgb(80, 80, 100)));
        let mut list_state = ListState::default().with_selected(Some(self.selected));
        frame.render_stateful_widget(list, list_area, &mut list_state);

        let lines: Vec<Line> = self.detail.iter().map(|l| Line::from(l.as_str())).collect();
        let detail = Paragraph::new(lines)
            .block(
                Block::default()
                    .title(format!(" {} ", self.detail_title))
                    .borders(Borders::ALL),
            )
            .wrap(Wrap { trim: false });
        frame.render_widget(detail, detail_area);

        let help = Paragraph::new(Line::from(Span::styled(
            " ↑/↓ select  r refresh  p plan  f fix  q quit",
            Style::default().fg(Color::DarkGray),
        )));
        frame.render_widget(help, help_area);
    }
}

fn project_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn status_style(status: &RepositoryStatus) -> Style {
    let color = match status {
        RepositoryStatus::Clean => Color::Green,
        RepositoryStatus::Modified { .. } => Color::Yellow,
        RepositoryStatus::Ahead { .. } | RepositoryStatus::Behind { .. } => Color::Cyan,
        RepositoryStatus::Diverged { .. } => Color::Magenta,
        RepositoryStatus::NoRemote { .. } => Color::Blue,
        RepositoryStatus::NotARepository => Color::DarkGray,
        RepositoryStatus::Error => Color::Red,
    };
    Style::default().fg(color)
}

fn is_quit(key: &KeyEvent) -> bool {
    matches!(key.code, KeyCode::Char('q') | KeyCode::Esc)
        || (key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL))
}

/// Dashboard event loop. Runs on a blocking thread; engine calls are
/// driven to completion on the runtime `handle`.
struct App {
    engine: Arc<Engine>,
    handle: Handle,
    state: DashboardState,
    running: bool,
}

impl App {
    fn run(&mut self, terminal: &mut DefaultTerminal) -> Result<()> {
        self.refresh();
        while self.running {
            terminal.draw(|frame| self.state.draw(frame))?;
            self.handle_events()?;
        }
        info!("dashboard closed");
        Ok(())
    }

    fn handle_events(&mut self) -> Result<()> {
        if !event::poll(TICK)? {
            return Ok(());
        }
        let Event::Key(key) = event::read()? else {
            return Ok(());
        };
        if key.kind != KeyEventKind::Press {
            return Ok(());
        }
        if is_quit(&key) {
            self.running = false;
            return Ok(());
        }
        match key.code {
            KeyCode::Down | KeyCode::Char('j') => self.state.select_next(),
            KeyCode::Up | KeyCode::Char('k') => self.state.select_previous(),
            KeyCode::Char('r') => self.refresh(),
            KeyCode::Char('p') => self.plan(),
            KeyCode::Char('f') => self.fix(),
            _ => {}
        }
        Ok(())
    }

    fn refresh(&mut self) {
        let statuses = self
            .handle
            .block_on(self.engine.get_status_all(&self.state.projects));
        self.state.set_statuses(statuses);
    }

    fn plan(&mut self) {
        let Some(path) = self.state.selected_project().cloned() else {
            return;
        };
        let plan = self.handle.block_on(self.engine.get_fix_plan(&path));
        self.state.show_plan(&path, plan);
    }

    fn fix(&mut self) {
        let Some(path) = self.state.selected_project().cloned() else {
            return;
        };
        let Some(plan) = self.state.take_reviewed_plan(&path) else {
            self.state.show_unreviewed();
            return;
        };
        let result = self.handle.block_on(self.engine.execute_plan(&path, &plan));
        self.state.show_result(&result);
        self.refresh();
    }
}

#[cfg(test)]
mod tests {
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;
    use vibeterm_core::git::GitCommand;

    use super::*;

    fn state() -> DashboardState {
        DashboardState::new(vec![
            PathBuf::from("/work/api"),
            PathBuf::from("/work/web"),
            PathBuf::from("/work/docs"),
        ])
    }

    fn rendered(state: &DashboardState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(80, 20)).expect("should create terminal");
        terminal
            .draw(|frame| state.draw(frame))
            .expect("should draw");
        terminal
            .backend()
            .buffer()
            .content()
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn test_should_wrap_selection() {
        let mut state = state();
        state.select_previous();
        assert_eq!(state.selected_project(), Some(&PathBuf::from("/work/docs")));
        state.select_next();
        assert_eq!(state.selected_project(), Some(&PathBuf::from("/work/api")));
    }

    #[test]
    fn test_should_ignore_selection_without_projects() {
        let mut state = DashboardState::new(Vec::new());
        state.select_next();
        state.select_previous();
        assert!(state.selected_project().is_none());
    }

    #[test]
    fn test_should_render_projects_with_status() {
        let mut state = state();
        state.set_statuses(BTreeMap::from([(
            PathBuf::from("/work/api"),
            RepositoryStatus::Behind {
                behind: 2,
                modified: 0,
                untracked: 0,
            },
        )]));

        let screen = rendered(&state);
        assert!(screen.contains("api"));
        assert!(screen.contains("behind 2"));
        assert!(screen.contains("docs"));
    }

    fn pull_plan() -> RemediationPlan {
        RemediationPlan {
            can_fix: true,
            actions: vec!["Pull 2 commit(s)".to_owned()],
            commands: vec![GitCommand::Pull { rebase: false }],
            warning: Some("careful".to_owned()),
        }
    }

    #[test]
    fn test_should_show_plan_details() {
        let mut state = state();
        state.show_plan(Path::new("/work/api"), pull_plan());

        assert_eq!(
            state.detail,
            vec!["- Pull 2 commit(s)", "warning: careful", "press f to apply"]
        );
        assert!(rendered(&state).contains("Pull 2 commit(s)"));
    }

    #[test]
    fn test_should_apply_only_the_plan_shown_for_a_project() {
        let mut state = state();
        let api = Path::new("/work/api");
        assert!(state.take_reviewed_plan(api).is_none());

        state.show_plan(api, pull_plan());
        assert!(state.take_reviewed_plan(Path::new("/work/web")).is_none());
        assert_eq!(state.take_reviewed_plan(api), Some(pull_plan()));
        // A plan is applied at most once.
        assert!(state.take_reviewed_plan(api).is_none());

        state.show_unreviewed();
        assert_eq!(state.detail, vec!["press p to review the plan first"]);
    }

    #[test]
    fn test_should_forget_plan_that_cannot_be_applied() {
        let mut state = state();
        let api = Path::new("/work/api");
        state.show_plan(api, pull_plan());
        state.show_plan(
            api,
            RemediationPlan {
                can_fix: false,
                actions: vec!["Already clean".to_owned()],
                commands: Vec::new(),
                warning: None,
            },
        );

        assert!(state.take_reviewed_plan(api).is_none());
        assert_eq!(state.detail, vec!["- Already clean"]);
    }

    #[test]
    fn test_should_show_fix_failure() {
        let mut state = state();
        state.show_result(&RemediationResult {
            success: false,
            output: "$ git add -A\n".to_owned(),
            error: Some("rejected".to_owned()),
        });

        assert_eq!(state.detail_title, "Fix failed");
        assert_eq!(state.detail, vec!["$ git add -A", "error: rejected"]);
    }

    #[test]
    fn test_should_quit_on_q_esc_and_ctrl_c() {
        assert!(is_quit(&KeyEvent::new(KeyCode::Char('q'), KeyModifiers::NONE)));
        assert!(is_quit(&KeyEvent::new(KeyCode::Esc, KeyModifiers::NONE)));
        assert!(is_quit(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL)));
        assert!(!is_quit(&KeyEvent::new(KeyCode::Char('c'), KeyModifiers::NONE)));
    }
}
