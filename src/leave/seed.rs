//! Demo roster and token table used by the default server and the CLI
//! report. Production deployments replace these with the HR directory and
//! the identity provider.

use std::sync::Arc;

use super::directory::{InMemoryDirectory, StaticTokens};
use super::domain::{AuthContext, Role, TeamId, TeamMember, UserId};
use super::notify::InMemoryNotifier;
use super::store::InMemoryLeaveStore;

pub struct SeedWorld {
    pub store: Arc<InMemoryLeaveStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub notifier: Arc<InMemoryNotifier>,
    pub tokens: Arc<StaticTokens>,
    pub teams: Vec<TeamId>,
}

const SUPPORT_TEAM: &[(u64, &str)] = &[
    (2, "asha"),
    (3, "liam"),
    (4, "meera"),
    (5, "jonas"),
    (6, "tara"),
    (7, "felix"),
    (8, "nadia"),
    (9, "ravi"),
    (10, "elena"),
];

const PLATFORM_TEAM: &[(u64, &str)] = &[(12, "omar"), (13, "ines"), (14, "dev")];

/// Two teams and a cross-team L5 viewer. Team 1 has ten members so each
/// absence moves shrinkage by a clean 10 percent.
pub fn demo_world() -> SeedWorld {
    let mut directory = InMemoryDirectory::new();
    let mut tokens = StaticTokens::new();

    let add = |directory: &mut InMemoryDirectory,
               tokens: &mut StaticTokens,
               id: u64,
               username: &str,
               team: u64,
               role: Role| {
        directory.add_member(TeamMember {
            id: UserId(id),
            username: username.to_string(),
            team_id: TeamId(team),
            role,
        });
        tokens.insert(
            format!("token-{username}"),
            AuthContext {
                user_id: UserId(id),
                role,
                team_id: TeamId(team),
            },
        );
    };

    add(&mut directory, &mut tokens, 1, "priya", 1, Role::Manager);
    for (id, username) in SUPPORT_TEAM {
        add(&mut directory, &mut tokens, *id, username, 1, Role::Associate);
    }

    add(&mut directory, &mut tokens, 11, "sofia", 2, Role::Manager);
    for (id, username) in PLATFORM_TEAM {
        add(&mut directory, &mut tokens, *id, username, 2, Role::Associate);
    }

    add(&mut directory, &mut tokens, 15, "marcus", 2, Role::L5);

    SeedWorld {
        store: Arc::new(InMemoryLeaveStore::new()),
        directory: Arc::new(directory),
        notifier: Arc::new(InMemoryNotifier::new()),
        tokens: Arc::new(tokens),
        teams: vec![TeamId(1), TeamId(2)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::leave::directory::{IdentityResolver, TeamDirectory};

    #[test]
    fn demo_world_has_clean_team_sizes() {
        let world = demo_world();
        assert_eq!(world.directory.team_members(TeamId(1)).len(), 10);
        assert_eq!(world.directory.manager_of(TeamId(1)), Some(UserId(1)));
    }

    #[test]
    fn tokens_resolve_to_their_members() {
        let world = demo_world();
        let priya = world.tokens.resolve("token-priya").expect("manager token");
        assert_eq!(priya.role, Role::Manager);
        assert_eq!(priya.team_id, TeamId(1));
        assert!(world.tokens.resolve("token-nobody").is_none());
    }
}
