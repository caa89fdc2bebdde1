//! Application configuration for JobPilot.
//!
//! User config lives at `~/.jobpilot/jobpilot.toml`.
//! CLI flags override config file values, which override defaults.
//! The loosely-typed file is validated once into [`RunOptions`] and
//! [`ProfileCriteria`] before a run starts.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{JobPilotError, Result};
use crate::schedule::{TimeWindow, WeekdayPolicy, parse_weekday};
use crate::types::ProfileCriteria;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "jobpilot.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".jobpilot";

/// Tolerance when checking that scoring weights sum to one.
const WEIGHT_TOLERANCE: f64 = 1e-6;

// ---------------------------------------------------------------------------
// Config structs (matching jobpilot.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub profile: ProfileConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    #[serde(default)]
    pub scoring: MatchWeights,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub site: SiteConfig,

    #[serde(default)]
    pub executor: ExecutorConfig,

    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[profile]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default = "default_keywords")]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub experience_years: u32,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub remote_ok: bool,
    #[serde(default)]
    pub industries: Vec<String>,
    #[serde(default)]
    pub blacklisted_companies: Vec<String>,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            keywords: default_keywords(),
            skills: Vec::new(),
            experience_years: 0,
            education: Vec::new(),
            location: None,
            remote_ok: false,
            industries: Vec::new(),
            blacklisted_companies: Vec::new(),
        }
    }
}

fn default_keywords() -> Vec<String> {
    vec!["Data Analyst".into()]
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Maximum successful submissions in one run.
    #[serde(default = "default_max_applications")]
    pub max_applications: u32,

    /// Maximum successful submissions per local day.
    #[serde(default = "default_daily_limit")]
    pub daily_limit: u32,

    #[serde(default = "default_true")]
    pub easy_apply_only: bool,

    /// Minimum match score; omit to disable match filtering.
    #[serde(default = "default_match_threshold")]
    pub match_threshold: Option<f64>,

    #[serde(default)]
    pub dry_run: bool,

    /// Pause after each successful submission, in seconds.
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    /// Stop loading results once this many candidates were discovered.
    #[serde(default = "default_target_candidates")]
    pub target_candidates: usize,

    /// Upper bound on "load more" requests per search.
    #[serde(default = "default_max_load_attempts")]
    pub max_load_attempts: u32,

    /// Stop loading after this many consecutive loads that found nothing new.
    #[serde(default = "default_stale_load_limit")]
    pub stale_load_limit: u32,

    /// How long to wait for a human to clear a login challenge (0 = halt immediately).
    #[serde(default)]
    pub auth_challenge_grace_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_applications: default_max_applications(),
            daily_limit: default_daily_limit(),
            easy_apply_only: true,
            match_threshold: default_match_threshold(),
            dry_run: false,
            cooldown_secs: default_cooldown(),
            target_candidates: default_target_candidates(),
            max_load_attempts: default_max_load_attempts(),
            stale_load_limit: default_stale_load_limit(),
            auth_challenge_grace_secs: 0,
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_max_applications() -> u32 {
    10
}
fn default_daily_limit() -> u32 {
    10
}
fn default_match_threshold() -> Option<f64> {
    Some(70.0)
}
fn default_cooldown() -> u64 {
    60
}
fn default_target_candidates() -> usize {
    50
}
fn default_max_load_attempts() -> u32 {
    10
}
fn default_stale_load_limit() -> u32 {
    3
}

/// `[schedule]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Allowed windows; empty means any time of day.
    #[serde(default = "default_windows")]
    pub windows: Vec<WindowConfig>,

    #[serde(default = "default_true")]
    pub weekdays_only: bool,

    /// Explicit allowed days (e.g. `["mon", "wed"]`); overrides `weekdays_only`.
    #[serde(default)]
    pub days: Vec<String>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            windows: default_windows(),
            weekdays_only: true,
            days: Vec::new(),
        }
    }
}

/// One `[[schedule.windows]]` entry in `HH:MM` form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub start: String,
    pub end: String,
}

fn default_windows() -> Vec<WindowConfig> {
    [("09:00", "11:00"), ("14:00", "16:00"), ("19:00", "21:00")]
        .into_iter()
        .map(|(start, end)| WindowConfig {
            start: start.into(),
            end: end.into(),
        })
        .collect()
}

/// `[scoring]` section: weights of the match sub-scores. Must sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchWeights {
    pub skills: f64,
    pub experience: f64,
    pub education: f64,
    pub location: f64,
    pub industry: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            skills: 0.40,
            experience: 0.25,
            education: 0.15,
            location: 0.10,
            industry: 0.10,
        }
    }
}

impl MatchWeights {
    pub fn validate(&self) -> Result<()> {
        let all = [
            self.skills,
            self.experience,
            self.education,
            self.location,
            self.industry,
        ];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(JobPilotError::config(
                "scoring weights must be finite and non-negative",
            ));
        }
        let sum: f64 = all.iter().sum();
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(JobPilotError::config(format!(
                "scoring weights must sum to 1.0 (got {sum})"
            )));
        }
        Ok(())
    }
}

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebDriver endpoint (chromedriver, geckodriver, selenium).
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,

    #[serde(default = "default_browser")]
    pub browser: String,

    #[serde(default)]
    pub headless: bool,

    /// Upper bound for any single browser operation.
    #[serde(default = "default_op_timeout")]
    pub op_timeout_secs: u64,

    /// Directory holding the session lock file (defaults to `~/.jobpilot/state`).
    #[serde(default)]
    pub state_dir: Option<String>,

    /// Name of the env var holding the account username (never store the value itself).
    #[serde(default = "default_username_env")]
    pub username_env: String,

    /// Name of the env var holding the account password.
    #[serde(default = "default_password_env")]
    pub password_env: String,

    #[serde(default = "default_login_attempts")]
    pub login_attempts: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            webdriver_url: default_webdriver_url(),
            browser: default_browser(),
            headless: false,
            op_timeout_secs: default_op_timeout(),
            state_dir: None,
            username_env: default_username_env(),
            password_env: default_password_env(),
            login_attempts: default_login_attempts(),
        }
    }
}

fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_browser() -> String {
    "chrome".into()
}
fn default_op_timeout() -> u64 {
    20
}
fn default_username_env() -> String {
    "JOBPILOT_USERNAME".into()
}
fn default_password_env() -> String {
    "JOBPILOT_PASSWORD".into()
}
fn default_login_attempts() -> u32 {
    3
}

/// `[site]` section: where the target application lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfig {
    #[serde(default = "default_login_url")]
    pub login_url: String,

    #[serde(default = "default_search_url")]
    pub search_url: String,

    /// Substrings of a URL that indicate a verification checkpoint.
    #[serde(default = "default_challenge_markers")]
    pub challenge_markers: Vec<String>,

    /// Substrings of a URL that indicate a logged-in landing page.
    #[serde(default = "default_logged_in_url_markers")]
    pub logged_in_url_markers: Vec<String>,

    /// Elements whose presence indicates a verification checkpoint.
    #[serde(default = "default_challenge_selectors")]
    pub challenge_selectors: Vec<String>,

    /// Elements whose presence indicates a logged-in page.
    #[serde(default = "default_logged_in_selectors")]
    pub logged_in_selectors: Vec<String>,

    #[serde(default = "default_username_selector")]
    pub username_selector: String,

    #[serde(default = "default_password_selector")]
    pub password_selector: String,

    #[serde(default = "default_submit_selector")]
    pub submit_selector: String,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            login_url: default_login_url(),
            search_url: default_search_url(),
            challenge_markers: default_challenge_markers(),
            logged_in_url_markers: default_logged_in_url_markers(),
            challenge_selectors: default_challenge_selectors(),
            logged_in_selectors: default_logged_in_selectors(),
            username_selector: default_username_selector(),
            password_selector: default_password_selector(),
            submit_selector: default_submit_selector(),
        }
    }
}

fn default_login_url() -> String {
    "https://www.linkedin.com/login".into()
}
fn default_search_url() -> String {
    "https://www.linkedin.com/jobs/search/".into()
}
fn default_challenge_markers() -> Vec<String> {
    vec!["checkpoint".into(), "challenge".into()]
}
fn default_logged_in_url_markers() -> Vec<String> {
    vec!["/feed".into()]
}
fn default_challenge_selectors() -> Vec<String> {
    vec![
        "form#captcha-challenge".into(),
        "#input__email_verification_pin".into(),
        "iframe[src*='captcha']".into(),
    ]
}
fn default_logged_in_selectors() -> Vec<String> {
    vec![".feed-container".into(), "nav.global-nav".into()]
}
fn default_username_selector() -> String {
    "#username".into()
}
fn default_password_selector() -> String {
    "#password".into()
}
fn default_submit_selector() -> String {
    "button[type='submit']".into()
}

/// `[executor]` section: values typed into application forms.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Retries per state transition (total tries = retries + 1).
    #[serde(default = "default_step_retries")]
    pub step_retries: u32,

    #[serde(default = "default_max_form_pages")]
    pub max_form_pages: u32,

    #[serde(default)]
    pub phone: Option<String>,

    #[serde(default)]
    pub email: Option<String>,

    /// Absolute path of the resume file to upload.
    #[serde(default)]
    pub resume_path: Option<String>,

    /// Cover letter template; `{title}`, `{company}`, `{skills}`, `{years}` are substituted.
    #[serde(default = "default_cover_letter")]
    pub cover_letter: String,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_retries: default_step_retries(),
            max_form_pages: default_max_form_pages(),
            phone: None,
            email: None,
            resume_path: None,
            cover_letter: default_cover_letter(),
        }
    }
}

fn default_step_retries() -> u32 {
    2
}
fn default_max_form_pages() -> u32 {
    5
}
fn default_cover_letter() -> String {
    "Dear Hiring Manager,\n\n\
     I am excited to apply for the {title} position at {company}. \
     With my background in {skills} and {years} years of experience, \
     I am confident I would be a valuable addition to your team.\n\n\
     Best regards"
        .into()
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database path (defaults to `~/.jobpilot/jobpilot.db`).
    #[serde(default)]
    pub db_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Runtime run options (validated once at run start)
// ---------------------------------------------------------------------------

/// Validated run options, merged from config file + CLI flags.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub max_applications: u32,
    pub daily_limit: u32,
    pub allowed_windows: Vec<TimeWindow>,
    pub weekday_policy: WeekdayPolicy,
    pub easy_apply_only: bool,
    /// `None` disables match filtering.
    pub match_threshold: Option<f64>,
    pub dry_run: bool,
    pub cooldown: Duration,
    pub target_candidates: usize,
    pub max_load_attempts: u32,
    pub stale_load_limit: u32,
    pub auth_challenge_grace: Duration,
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        if self.daily_limit == 0 {
            return Err(JobPilotError::config("daily_limit must be at least 1"));
        }
        if self.max_applications == 0 {
            return Err(JobPilotError::config("max_applications must be at least 1"));
        }
        if let Some(t) = self.match_threshold {
            if !(0.0..=100.0).contains(&t) {
                return Err(JobPilotError::config(format!(
                    "match_threshold must be within 0..=100 (got {t})"
                )));
            }
        }
        if self.target_candidates == 0 {
            return Err(JobPilotError::config("target_candidates must be at least 1"));
        }
        if self.stale_load_limit == 0 {
            return Err(JobPilotError::config("stale_load_limit must be at least 1"));
        }
        Ok(())
    }
}

impl TryFrom<&AppConfig> for RunOptions {
    type Error = JobPilotError;

    fn try_from(config: &AppConfig) -> Result<Self> {
        let allowed_windows = config
            .schedule
            .windows
            .iter()
            .map(|w| TimeWindow::parse(&w.start, &w.end))
            .collect::<Result<Vec<_>>>()?;

        let weekday_policy = if !config.schedule.days.is_empty() {
            WeekdayPolicy::Only(
                config
                    .schedule
                    .days
                    .iter()
                    .map(|d| parse_weekday(d))
                    .collect::<Result<Vec<_>>>()?,
            )
        } else if config.schedule.weekdays_only {
            WeekdayPolicy::WeekdaysOnly
        } else {
            WeekdayPolicy::Any
        };

        let options = Self {
            max_applications: config.run.max_applications,
            daily_limit: config.run.daily_limit,
            allowed_windows,
            weekday_policy,
            easy_apply_only: config.run.easy_apply_only,
            match_threshold: config.run.match_threshold,
            dry_run: config.run.dry_run,
            cooldown: Duration::from_secs(config.run.cooldown_secs),
            target_candidates: config.run.target_candidates,
            max_load_attempts: config.run.max_load_attempts,
            stale_load_limit: config.run.stale_load_limit,
            auth_challenge_grace: Duration::from_secs(config.run.auth_challenge_grace_secs),
        };
        options.validate()?;
        Ok(options)
    }
}

impl From<&ProfileConfig> for ProfileCriteria {
    fn from(profile: &ProfileConfig) -> Self {
        Self {
            keywords: profile
                .keywords
                .iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            skills: profile
                .skills
                .iter()
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            experience_years: profile.experience_years,
            education: profile.education.clone(),
            location: profile
                .location
                .as_ref()
                .map(|l| l.trim().to_string())
                .filter(|l| !l.is_empty()),
            remote_ok: profile.remote_ok,
            industries: profile.industries.clone(),
            blacklisted_companies: profile.blacklisted_companies.clone(),
        }
    }
}

impl SiteConfig {
    pub fn login_url(&self) -> Result<Url> {
        Url::parse(&self.login_url)
            .map_err(|e| JobPilotError::config(format!("invalid login_url: {e}")))
    }

    pub fn search_url(&self) -> Result<Url> {
        Url::parse(&self.search_url)
            .map_err(|e| JobPilotError::config(format!("invalid search_url: {e}")))
    }
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Account credentials resolved from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Read the credentials from the env vars named in `[session]`.
pub fn load_credentials(config: &SessionConfig) -> Result<Credentials> {
    let read = |var: &str| match std::env::var(var) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(JobPilotError::config(format!(
            "credentials not found. Set the {var} environment variable."
        ))),
    };
    Ok(Credentials {
        username: read(&config.username_env)?,
        password: read(&config.password_env)?,
    })
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.jobpilot/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| JobPilotError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.jobpilot/jobpilot.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Directory for the session lock file.
pub fn state_dir(config: &SessionConfig) -> Result<PathBuf> {
    match &config.state_dir {
        Some(dir) => Ok(expand_home(dir)),
        None => Ok(config_dir()?.join("state")),
    }
}

/// Database path for the persistence layer.
pub fn db_path(config: &StorageConfig) -> Result<PathBuf> {
    match &config.db_path {
        Some(path) => Ok(expand_home(path)),
        None => Ok(config_dir()?.join("jobpilot.db")),
    }
}

fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| JobPilotError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        JobPilotError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.scoring.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| JobPilotError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| JobPilotError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| JobPilotError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("daily_limit"));
        assert!(toml_str.contains("JOBPILOT_PASSWORD"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.run.daily_limit, 10);
        assert_eq!(parsed.schedule.windows.len(), 3);
        assert_eq!(parsed.session.username_env, "JOBPILOT_USERNAME");
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[profile]
keywords = ["Rust Engineer"]
skills = ["Rust", " SQL ", ""]
experience_years = 4

[run]
daily_limit = 3
dry_run = true

[schedule]
windows = []
days = ["mon", "thu"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        let options = RunOptions::try_from(&config).expect("validate");
        assert_eq!(options.daily_limit, 3);
        assert!(options.dry_run);
        assert!(options.allowed_windows.is_empty());
        assert_eq!(
            options.weekday_policy,
            WeekdayPolicy::Only(vec![chrono::Weekday::Mon, chrono::Weekday::Thu])
        );

        let profile = ProfileCriteria::from(&config.profile);
        assert_eq!(profile.skills.len(), 2);
        assert!(profile.skills.contains("rust"));
        assert!(profile.skills.contains("sql"));
    }

    #[test]
    fn run_options_from_defaults() {
        let options = RunOptions::try_from(&AppConfig::default()).expect("defaults are valid");
        assert_eq!(options.weekday_policy, WeekdayPolicy::WeekdaysOnly);
        assert_eq!(options.allowed_windows.len(), 3);
        assert_eq!(options.match_threshold, Some(70.0));
        assert_eq!(options.cooldown, Duration::from_secs(60));
    }

    #[test]
    fn rejects_invalid_options() {
        let mut config = AppConfig::default();
        config.run.daily_limit = 0;
        assert!(RunOptions::try_from(&config).is_err());

        let mut config = AppConfig::default();
        config.run.match_threshold = Some(120.0);
        assert!(RunOptions::try_from(&config).is_err());

        let mut config = AppConfig::default();
        config.schedule.windows = vec![WindowConfig {
            start: "9am".into(),
            end: "11:00".into(),
        }];
        assert!(RunOptions::try_from(&config).is_err());
    }

    #[test]
    fn weights_must_sum_to_one() {
        assert!(MatchWeights::default().validate().is_ok());
        let skewed = MatchWeights {
            skills: 0.9,
            ..MatchWeights::default()
        };
        let err = skewed.validate().unwrap_err();
        assert!(err.to_string().contains("sum to 1.0"));
    }

    #[test]
    fn missing_credentials_are_reported() {
        let session = SessionConfig {
            username_env: "JP_TEST_NONEXISTENT_USER_12345".into(),
            password_env: "JP_TEST_NONEXISTENT_PASS_12345".into(),
            ..SessionConfig::default()
        };
        let err = load_credentials(&session).unwrap_err();
        assert!(err.to_string().contains("JP_TEST_NONEXISTENT_USER_12345"));
    }

    #[test]
    fn credentials_debug_redacts_password() {
        let creds = Credentials {
            username: "ada".into(),
            password: "hunter2".into(),
        };
        let dbg = format!("{creds:?}");
        assert!(dbg.contains("ada"));
        assert!(!dbg.contains("hunter2"));
    }
}
