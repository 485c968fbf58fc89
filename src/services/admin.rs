//! Administration operations.
//!
//! These are the calls an admin UI makes. Each one that changes state is
//! written to the command log under the acting staff member. Property edits
//! never fail: any error comes back as the message shown to the invoker.

use serde::Serialize;
use thiserror::Error;

use crate::persist::Serial;
use crate::services::accounts::AccountError;
use crate::services::command_log::{format_entity, Actor};
use crate::services::firewall::FirewallError;
use crate::services::Shard;
use crate::world::dupe::{dupe_item, DupeError, DupeOrigin};

#[derive(Debug, Error)]
pub enum AdminError {
    #[error(transparent)]
    Account(#[from] AccountError),

    #[error(transparent)]
    Firewall(#[from] FirewallError),

    #[error(transparent)]
    Dupe(#[from] DupeError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerStats {
    pub active_accounts: usize,
    pub banned_accounts: usize,
    pub firewalled: usize,
    pub clients: usize,
    pub mobiles: usize,
    pub items: usize,
    pub mobile_types: usize,
    pub item_types: usize,
}

impl Shard {
    pub fn stats(&self) -> ServerStats {
        let banned = self.accounts.iter().filter(|a| a.banned).count();
        ServerStats {
            active_accounts: self.accounts.len() - banned,
            banned_accounts: banned,
            firewalled: self.firewall.len(),
            clients: self.netstates.count(),
            mobiles: self.world.mobile_count(),
            items: self.world.item_count(),
            mobile_types: self.world.mobile_types().len(),
            item_types: self.world.item_types().len(),
        }
    }

    /// `0x00000002 (Bull)`, or the bare serial for a deleted entity.
    pub fn describe(&self, serial: Serial) -> String {
        let type_name = match (self.world.item(serial), self.world.mobile(serial)) {
            (Some(item), _) => item.type_name(),
            (_, Some(mobile)) => mobile.type_name(),
            _ => return serial.to_string(),
        };
        format_entity(serial, type_name)
    }

    /// Firewall every address `account` has logged in from. Returns how many
    /// were newly added.
    pub fn firewall_account(&mut self, actor: &Actor, account: &str) -> Result<usize, AdminError> {
        let ips = self
            .accounts
            .get(account)
            .ok_or_else(|| AccountError::NotFound(account.to_string()))?
            .login_ips
            .clone();
        let mut added = 0;
        for ip in &ips {
            if self.firewall.add(ip)? {
                added += 1;
            }
        }
        self.commands.write_line(
            actor,
            &format!(
                "{} {} firewalled {} address(es) of account '{}'",
                actor.access_level, actor, added, account
            ),
        );
        Ok(added)
    }

    pub fn firewall_address(&mut self, actor: &Actor, entry: &str) -> Result<bool, AdminError> {
        let added = self.firewall.add(entry)?;
        if added {
            self.commands.write_line(
                actor,
                &format!("{} {} firewalled {}", actor.access_level, actor, entry.trim()),
            );
        }
        Ok(added)
    }

    /// Ban `account` and disconnect its clients. Returns the number kicked.
    pub fn ban_account(&mut self, actor: &Actor, account: &str) -> Result<usize, AdminError> {
        self.accounts.set_banned(account, true)?;
        let kicked = self.netstates.kick_account(account).len();
        self.commands.write_line(
            actor,
            &format!(
                "{} {} banned account '{}' ({} client(s) kicked)",
                actor.access_level, actor, account, kicked
            ),
        );
        Ok(kicked)
    }

    pub fn unban_account(&mut self, actor: &Actor, account: &str) -> Result<(), AdminError> {
        self.accounts.set_banned(account, false)?;
        self.commands.write_line(
            actor,
            &format!("{} {} unbanned account '{}'", actor.access_level, actor, account),
        );
        Ok(())
    }

    /// Set a property from its text form and return the message for the invoker.
    pub fn set_property(&mut self, actor: &Actor, serial: Serial, name: &str, value: &str) -> String {
        let target = self.describe(serial);
        match self.world.set_property(serial, name, value) {
            Ok(()) => {
                self.commands.write_line(
                    actor,
                    &format!(
                        "{} {} set property '{}' of {} to '{}'",
                        actor.access_level, actor, name, target, value
                    ),
                );
                "Property has been set.".to_string()
            }
            Err(e) => e.to_string(),
        }
    }

    pub fn dupe(
        &mut self,
        actor: &Actor,
        source: Serial,
        count: i32,
        in_bag: bool,
        origin: &DupeOrigin,
    ) -> Result<Vec<Serial>, AdminError> {
        let target = self.describe(source);
        self.commands.write_line(
            actor,
            &format!(
                "{} {} duping {} (inBag={}; amount={})",
                actor.access_level, actor, target, in_bag, count
            ),
        );
        Ok(dupe_item(&mut self.world, source, count, in_bag, origin)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::content::items::{PlainItem, PlainKind};
    use crate::services::accounts::{fast_config, AccessLevel};
    use crate::services::command_log::CommandLog;
    use crate::world::geo::{Map, Point3D};
    use chrono::Utc;

    fn shard(log_dir: &std::path::Path) -> Shard {
        let config = Config {
            accounts: fast_config(),
            ..Config::default()
        };
        let mut shard = Shard::new(&config).unwrap();
        shard.commands = CommandLog::new(log_dir, true);
        shard
    }

    fn gm() -> Actor {
        Actor::new("Pix", Some("pix"), AccessLevel::GameMaster)
    }

    #[test]
    fn ban_kicks_clients_and_firewall_covers_login_ips() {
        let dir = tempfile::tempdir().unwrap();
        let mut shard = shard(dir.path());
        shard.accounts.create("griefer", "password1").unwrap();
        let now = Utc::now();
        shard.accounts.record_login("griefer", "10.0.0.7", now).unwrap();
        shard.accounts.record_login("griefer", "10.0.0.8", now).unwrap();
        let conn = shard.netstates.connect("10.0.0.8".parse().unwrap());
        shard.netstates.attach_account(conn, "griefer");

        assert_eq!(shard.ban_account(&gm(), "griefer").unwrap(), 1);
        assert!(shard.accounts.get("griefer").unwrap().banned);
        assert_eq!(shard.firewall_account(&gm(), "griefer").unwrap(), 2);
        assert_eq!(shard.firewall_account(&gm(), "griefer").unwrap(), 0);

        let stats = shard.stats();
        assert_eq!(stats.banned_accounts, 1);
        assert_eq!(stats.active_accounts, 0);
        assert_eq!(stats.firewalled, 2);
        assert_eq!(stats.clients, 0);

        let log = std::fs::read_to_string(dir.path().join("GameMaster").join("_pix.log")).unwrap();
        assert!(log.contains("banned account 'griefer'"));
    }

    #[test]
    fn property_errors_become_messages() {
        let dir = tempfile::tempdir().unwrap();
        let mut shard = shard(dir.path());
        let serial = shard.world.next_item_serial().unwrap();
        shard
            .world
            .add_item(Box::new(PlainItem::new(serial, PlainKind::CrystalCaveBarrier)))
            .unwrap();

        assert_eq!(shard.set_property(&gm(), serial, "Hue", "1153"), "Property has been set.");
        assert_ne!(shard.set_property(&gm(), serial, "NoSuchThing", "1"), "Property has been set.");
        assert_ne!(shard.set_property(&gm(), serial, "Hue", "blue"), "Property has been set.");

        let log = std::fs::read_to_string(dir.path().join("GameMaster").join("_pix.log")).unwrap();
        assert_eq!(log.lines().count(), 1);
        assert!(log.contains("set property 'Hue'"));
    }

    #[test]
    fn dupe_is_logged_and_refuses_mobiles() {
        let dir = tempfile::tempdir().unwrap();
        let mut shard = shard(dir.path());
        let serial = shard.world.next_item_serial().unwrap();
        shard
            .world
            .add_item(Box::new(PlainItem::new(serial, PlainKind::CrystalCaveBarrier)))
            .unwrap();
        let origin = DupeOrigin {
            backpack: None,
            location: Point3D::new(1, 2, 3),
            map: Map::Felucca,
        };
        let copies = shard.dupe(&gm(), serial, 2, false, &origin).unwrap();
        assert_eq!(copies.len(), 2);
        assert_eq!(shard.stats().items, 3);

        let mobile = shard.world.next_mobile_serial().unwrap();
        assert!(matches!(
            shard.dupe(&gm(), mobile, 1, false, &origin),
            Err(AdminError::Dupe(DupeError::NotFound(_)))
        ));
    }
}
