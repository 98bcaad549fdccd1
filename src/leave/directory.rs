use std::collections::{BTreeMap, HashMap};

use super::domain::{AuthContext, Role, TeamId, TeamMember, UserId};

/// Roster lookups backing authorization checks and forecast denominators.
/// Membership is maintained by the external HR system; the engine only reads.
pub trait TeamDirectory: Send + Sync {
    fn member(&self, user: UserId) -> Option<TeamMember>;
    /// Roster of a team, ordered by user id.
    fn team_members(&self, team: TeamId) -> Vec<TeamMember>;
    fn manages(&self, user: UserId, team: TeamId) -> bool;
    fn teams_managed_by(&self, user: UserId) -> Vec<TeamId>;
    /// Approver to notify for a team's pending requests.
    fn manager_of(&self, team: TeamId) -> Option<UserId>;
}

/// Resolves a bearer token into a verified identity. Real deployments sit in
/// front of the corporate identity provider; tests and the demo use the
/// static table below.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, token: &str) -> Option<AuthContext>;
}

/// In-memory roster with an explicit manager assignment per team.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    members: BTreeMap<UserId, TeamMember>,
    managers: HashMap<TeamId, Vec<UserId>>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&mut self, member: TeamMember) {
        if member.role == Role::Manager {
            self.managers
                .entry(member.team_id)
                .or_default()
                .push(member.id);
        }
        self.members.insert(member.id, member);
    }

    /// Grant an existing member approval rights over an additional team.
    pub fn assign_manager(&mut self, team: TeamId, user: UserId) {
        let entry = self.managers.entry(team).or_default();
        if !entry.contains(&user) {
            entry.push(user);
        }
    }
}

impl TeamDirectory for InMemoryDirectory {
    fn member(&self, user: UserId) -> Option<TeamMember> {
        self.members.get(&user).cloned()
    }

    fn team_members(&self, team: TeamId) -> Vec<TeamMember> {
        self.members
            .values()
            .filter(|member| member.team_id == team)
            .cloned()
            .collect()
    }

    fn manages(&self, user: UserId, team: TeamId) -> bool {
        self.managers
            .get(&team)
            .map_or(false, |managers| managers.contains(&user))
    }

    fn teams_managed_by(&self, user: UserId) -> Vec<TeamId> {
        let mut teams: Vec<TeamId> = self
            .managers
            .iter()
            .filter(|(_, managers)| managers.contains(&user))
            .map(|(team, _)| *team)
            .collect();
        teams.sort();
        teams
    }

    fn manager_of(&self, team: TeamId) -> Option<UserId> {
        self.managers
            .get(&team)
            .and_then(|managers| managers.first().copied())
    }
}

/// Static bearer-token table for tests and local development.
#[derive(Debug, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, AuthContext>,
}

impl StaticTokens {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, token: impl Into<String>, context: AuthContext) {
        self.tokens.insert(token.into(), context);
    }
}

impl IdentityResolver for StaticTokens {
    fn resolve(&self, token: &str) -> Option<AuthContext> {
        self.tokens.get(token).copied()
    }
}
