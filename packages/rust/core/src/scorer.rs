//! Candidate matching: weighted compatibility between a posting and the profile.
//!
//! Pure and deterministic. Each sub-score lies in `[0, 100]`; the total is
//! the weighted sum, rounded to two decimals.

use std::collections::BTreeSet;

use regex::Regex;

use jobpilot_shared::{
    JobPilotError, JobPosting, MatchResult, MatchWeights, ProfileCriteria, Result, SubScores,
};

/// Built-in skill vocabulary, grouped by area.
const SKILL_VOCABULARY: &[&[&str]] = &[
    // programming
    &[
        "python", "java", "javascript", "typescript", "c++", "c#", "go", "rust", "php", "ruby",
        "swift", "kotlin", "scala", "r", "matlab", "sql",
    ],
    // data
    &[
        "machine learning", "deep learning", "artificial intelligence", "ai", "data analysis",
        "statistics", "pandas", "numpy", "scikit-learn", "tensorflow", "pytorch", "keras",
        "spark", "hadoop", "tableau", "power bi", "excel",
    ],
    // web
    &[
        "html", "css", "react", "angular", "vue", "node.js", "express", "django", "flask",
        "spring", "laravel", "ruby on rails", "api", "rest", "graphql", "microservices",
    ],
    // cloud
    &[
        "aws", "azure", "gcp", "google cloud", "amazon web services", "docker", "kubernetes",
        "terraform", "ansible", "jenkins", "ci/cd", "devops", "serverless", "lambda",
    ],
    // databases
    &[
        "mysql", "postgresql", "mongodb", "redis", "elasticsearch", "oracle", "sql server",
        "sqlite", "cassandra", "dynamodb",
    ],
    // soft skills
    &[
        "leadership", "communication", "teamwork", "problem solving", "project management",
        "agile", "scrum", "mentoring", "presentation",
    ],
];

const EDUCATION_KEYWORDS: &[&str] = &["bachelor", "master", "phd", "degree", "diploma", "certification"];

const REMOTE_MARKERS: &[&str] = &["remote", "work from home", "wfh", "distributed", "virtual"];

const EXPERIENCE_PATTERNS: &[&str] = &[
    r"(\d+)\+?\s*years?\s*(?:of\s*)?experience",
    r"(\d+)\+?\s*years?\s*in",
    r"minimum\s*(\d+)\s*years?",
    r"at\s*least\s*(\d+)\s*years?",
];

/// A skill and the token-boundary pattern that finds it in lowercase text.
struct SkillPattern {
    skill: String,
    pattern: Regex,
}

fn skill_pattern(skill: &str) -> Result<Regex> {
    Regex::new(&format!(
        r"(?:^|[^a-z0-9+#.]){}(?:$|[^a-z0-9+#])",
        regex::escape(skill)
    ))
    .map_err(|e| JobPilotError::validation(format!("invalid skill pattern '{skill}': {e}")))
}

pub struct MatchScorer {
    profile: ProfileCriteria,
    weights: MatchWeights,
    skills: Vec<SkillPattern>,
    experience: Vec<Regex>,
}

impl MatchScorer {
    /// Build a scorer for one profile. Fails if the weights do not sum to one.
    pub fn new(profile: ProfileCriteria, weights: MatchWeights) -> Result<Self> {
        weights.validate()?;

        let vocabulary: BTreeSet<String> = SKILL_VOCABULARY
            .iter()
            .flat_map(|area| area.iter().map(|s| s.to_string()))
            .chain(profile.skills.iter().cloned())
            .collect();
        let skills = vocabulary
            .into_iter()
            .map(|skill| {
                let pattern = skill_pattern(&skill)?;
                Ok(SkillPattern { skill, pattern })
            })
            .collect::<Result<Vec<_>>>()?;

        let experience = EXPERIENCE_PATTERNS
            .iter()
            .map(|p| Regex::new(p).map_err(|e| JobPilotError::validation(e.to_string())))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            profile,
            weights,
            skills,
            experience,
        })
    }

    pub fn profile(&self) -> &ProfileCriteria {
        &self.profile
    }

    /// Skills the posting asks for, drawn from the vocabulary and the profile.
    pub fn required_skills(&self, text: &str) -> BTreeSet<String> {
        let text = text.to_lowercase();
        self.skills
            .iter()
            .filter(|s| s.pattern.is_match(&text))
            .map(|s| s.skill.clone())
            .collect()
    }

    /// Largest "N years" figure stated in the text.
    pub fn required_years(&self, text: &str) -> Option<u32> {
        let text = text.to_lowercase();
        self.experience
            .iter()
            .flat_map(|re| re.captures_iter(&text))
            .filter_map(|c| c.get(1)?.as_str().parse::<u32>().ok())
            .max()
    }

    pub fn score(&self, posting: &JobPosting) -> MatchResult {
        let text = format!("{}\n{}", posting.title, posting.requirements);
        let lower = text.to_lowercase();

        let required = self.required_skills(&text);
        let matched: BTreeSet<String> = required
            .intersection(&self.profile.skills)
            .cloned()
            .collect();
        let missing: BTreeSet<String> = required.difference(&self.profile.skills).cloned().collect();

        let breakdown = SubScores {
            skills: if required.is_empty() {
                0.0
            } else {
                matched.len() as f64 / required.len() as f64 * 100.0
            },
            experience: self.experience_score(&text),
            education: self.education_score(&lower),
            location: self.location_score(posting, &lower),
            industry: self.industry_score(posting, &lower),
        };

        let w = &self.weights;
        let total = breakdown.skills * w.skills
            + breakdown.experience * w.experience
            + breakdown.education * w.education
            + breakdown.location * w.location
            + breakdown.industry * w.industry;
        let score = ((total * 100.0).round() / 100.0).clamp(0.0, 100.0);

        MatchResult {
            posting_id: posting.id.clone(),
            score,
            matched_skills: matched,
            missing_skills: missing,
            breakdown,
        }
    }

    fn experience_score(&self, text: &str) -> f64 {
        match self.required_years(text) {
            Some(required) if required > self.profile.experience_years => {
                self.profile.experience_years as f64 / required as f64 * 100.0
            }
            _ => 100.0,
        }
    }

    fn education_score(&self, lower: &str) -> f64 {
        let required: Vec<&str> = EDUCATION_KEYWORDS
            .iter()
            .copied()
            .filter(|k| lower.contains(k))
            .collect();
        if required.is_empty() {
            return 100.0;
        }
        let held = self.profile.education.join(" ").to_lowercase();
        if required.iter().any(|k| held.contains(k)) {
            100.0
        } else {
            50.0
        }
    }

    fn location_score(&self, posting: &JobPosting, lower: &str) -> f64 {
        let location = posting.location.as_deref().unwrap_or_default().to_lowercase();
        let remote = REMOTE_MARKERS
            .iter()
            .any(|m| location.contains(m) || lower.contains(m));

        if remote && self.profile.remote_ok {
            return 100.0;
        }
        match &self.profile.location {
            Some(preferred) => {
                let preferred = preferred.to_lowercase();
                if location.contains(&preferred) || lower.contains(&preferred) {
                    100.0
                } else {
                    50.0
                }
            }
            None => 75.0,
        }
    }

    fn industry_score(&self, posting: &JobPosting, lower: &str) -> f64 {
        if self.profile.industries.is_empty() {
            return 75.0;
        }
        let company = posting.company.to_lowercase();
        let hit = self.profile.industries.iter().any(|i| {
            let i = i.trim().to_lowercase();
            !i.is_empty() && (lower.contains(&i) || company.contains(&i))
        });
        if hit { 100.0 } else { 50.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jobpilot_shared::PostingId;
    use url::Url;

    fn posting(title: &str, requirements: &str, location: Option<&str>) -> JobPosting {
        let url = Url::parse("https://jobs.example.com/view/1").unwrap();
        JobPosting {
            id: PostingId::from_url(&url),
            url,
            title: title.into(),
            company: "Acme Analytics".into(),
            location: location.map(String::from),
            easy_apply: true,
            requirements: requirements.into(),
            discovered_at: Utc::now(),
        }
    }

    fn profile() -> ProfileCriteria {
        ProfileCriteria {
            keywords: vec!["Data Analyst".into()],
            skills: ["python", "sql", "tableau"].into_iter().map(String::from).collect(),
            experience_years: 3,
            education: vec!["Bachelor of Science in Statistics".into()],
            location: Some("Berlin".into()),
            remote_ok: true,
            industries: vec!["analytics".into()],
            blacklisted_companies: vec![],
        }
    }

    fn scorer() -> MatchScorer {
        MatchScorer::new(profile(), MatchWeights::default()).unwrap()
    }

    #[test]
    fn perfect_match_scores_100() {
        let p = posting(
            "Data Analyst",
            "Python and SQL. Tableau dashboards. 2 years of experience. Bachelor degree.",
            Some("Berlin, Germany"),
        );
        let result = scorer().score(&p);
        assert_eq!(result.score, 100.0);
        assert!(result.missing_skills.is_empty());
        assert_eq!(result.matched_skills.len(), 3);
    }

    #[test]
    fn sub_scores_follow_rules() {
        let p = posting(
            "Senior Analyst",
            "Python, Spark and AWS. At least 6 years in analytics. Master's degree required.",
            Some("Munich"),
        );
        let result = scorer().score(&p);
        let b = result.breakdown;

        // python matched; spark and aws missing
        assert!((b.skills - 100.0 / 3.0).abs() < 1e-9);
        assert_eq!(
            result.missing_skills,
            ["aws", "spark"].iter().map(|s| s.to_string()).collect::<BTreeSet<_>>()
        );
        assert_eq!(b.experience, 50.0);
        // "degree" required, but the profile says "bachelor of science" only
        assert_eq!(b.education, 50.0);
        assert_eq!(b.location, 50.0);
        assert_eq!(b.industry, 100.0);

        let expected = b.skills * 0.40 + 50.0 * 0.25 + 50.0 * 0.15 + 50.0 * 0.10 + 100.0 * 0.10;
        assert_eq!(result.score, (expected * 100.0).round() / 100.0);
    }

    #[test]
    fn no_named_skills_scores_zero_for_skills() {
        let p = posting("Office Manager", "Organised and friendly.", None);
        let result = scorer().score(&p);
        assert_eq!(result.breakdown.skills, 0.0);
        assert!(result.score < 100.0);
    }

    #[test]
    fn skills_match_on_token_boundaries() {
        let s = scorer();
        let found = s.required_skills("We use Go, R and C++ with Node.js; no Django.");
        for skill in ["go", "r", "c++", "node.js", "django"] {
            assert!(found.contains(skill), "missing {skill}");
        }
        let found = s.required_skills("Strong programming background, ongoing training");
        assert!(!found.contains("r"));
        assert!(!found.contains("go"));
    }

    #[test]
    fn remote_satisfies_location_when_accepted() {
        let p = posting("Data Analyst", "Python. Fully remote.", Some("United States"));
        assert_eq!(scorer().score(&p).breakdown.location, 100.0);

        let no_pref = MatchScorer::new(
            ProfileCriteria {
                location: None,
                remote_ok: false,
                ..profile()
            },
            MatchWeights::default(),
        )
        .unwrap();
        assert_eq!(no_pref.score(&p).breakdown.location, 75.0);
    }

    #[test]
    fn deterministic_and_bounded() {
        let s = scorer();
        let samples = [
            posting("", "", None),
            posting("Rust Engineer", "10+ years experience. PhD. Rust, Kubernetes.", Some("Remote")),
            posting("Data Analyst", "SQL SQL SQL python", Some("Berlin")),
        ];
        for p in &samples {
            let a = s.score(p);
            let b = s.score(p);
            assert_eq!(a, b);
            assert!((0.0..=100.0).contains(&a.score));
        }
    }

    #[test]
    fn rejects_bad_weights() {
        let weights = MatchWeights {
            industry: 0.5,
            ..MatchWeights::default()
        };
        assert!(MatchScorer::new(profile(), weights).is_err());
    }
}
