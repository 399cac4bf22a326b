use serde::{Deserialize, Serialize};

/// Exercise and team a dashboard session belongs to.
///
/// Supplied at launch and fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseIdentity {
    pub exercise: String,
    pub team: String,
}

impl ExerciseIdentity {
    pub fn new(exercise: impl Into<String>, team: impl Into<String>) -> Self {
        Self {
            exercise: exercise.into(),
            team: team.into(),
        }
    }

    /// Topic carrying this team's injects.
    pub fn feed_topic(&self) -> String {
        format!("exercise/{}/team/{}/feed", self.exercise, self.team)
    }

    pub fn timer_topic(&self) -> String {
        format!("exercise/{}/timer", self.exercise)
    }

    pub fn control_topic(&self) -> String {
        format!("exercise/{}/control", self.exercise)
    }

    pub fn status_topic(&self) -> String {
        format!("exercise/{}/status", self.exercise)
    }

    /// Distinguished feed shown on public displays.
    pub fn public_feed_topic(&self) -> String {
        format!("exercise/{}/public", self.exercise)
    }
}

/// What a dashboard is for, which decides the topics it listens to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardRole {
    /// A team's working dashboard
    #[default]
    Team,
    /// A public feed display; also follows the public-feed topic
    PublicFeed,
}

impl std::str::FromStr for DashboardRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "team" => Ok(DashboardRole::Team),
            "public" | "public_feed" | "public-feed" => Ok(DashboardRole::PublicFeed),
            other => Err(format!("Unknown role '{other}'. Use: team, public_feed")),
        }
    }
}

/// Declarative set of topics (re)subscribed whenever the bus connection
/// becomes ready.
///
/// Order is stable and topics are unique.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSet {
    topics: Vec<String>,
    feed_topic: String,
}

impl TopicSet {
    /// Derive the topic set for a dashboard.
    pub fn for_dashboard(
        identity: &ExerciseIdentity,
        role: DashboardRole,
        include_status: bool,
    ) -> Self {
        let feed_topic = identity.feed_topic();
        let mut set = Self {
            topics: Vec::with_capacity(5),
            feed_topic: feed_topic.clone(),
        };
        set.push(feed_topic);
        set.push(identity.timer_topic());
        set.push(identity.control_topic());
        if include_status {
            set.push(identity.status_topic());
        }
        if role == DashboardRole::PublicFeed {
            set.push(identity.public_feed_topic());
        }
        set
    }

    /// Build a set from explicit topic names. The first topic is the feed.
    pub fn from_topics<I, S>(topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self {
            topics: Vec::new(),
            feed_topic: String::new(),
        };
        for topic in topics {
            set.push(topic.into());
        }
        set.feed_topic = set.topics.first().cloned().unwrap_or_default();
        set
    }

    fn push(&mut self, topic: String) {
        if !self.topics.contains(&topic) {
            self.topics.push(topic);
        }
    }

    /// Topic that operator-published injects go to.
    pub fn feed_topic(&self) -> &str {
        &self.feed_topic
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.topics.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.topics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.iter().any(|t| t == topic)
    }
}
