use std::collections::HashSet;

use shared::domain::{UsageStats, VoiceCommand};

pub fn compute_usage_stats(commands: &[VoiceCommand]) -> UsageStats {
    let total_commands = commands.len();
    let verified_commands = commands.iter().filter(|c| c.is_verified).count();
    let avg_response_time = if total_commands == 0 {
        0.0
    } else {
        let sum: f64 = commands.iter().map(|c| c.public_value1 as f64).sum();
        sum / total_commands as f64
    };
    let active_users = commands
        .iter()
        .map(|c| &c.creator)
        .collect::<HashSet<_>>()
        .len();

    UsageStats {
        total_commands,
        verified_commands,
        avg_response_time,
        active_users,
    }
}

#[cfg(test)]
mod tests {
    use shared::domain::{ActorAddress, CiphertextHandle, CommandId};

    use super::*;

    fn command(id: &str, creator: &str, public_value1: u64, is_verified: bool) -> VoiceCommand {
        VoiceCommand {
            id: CommandId::new(id),
            name: id.into(),
            ciphertext: CiphertextHandle::new(id),
            timestamp_secs: 0,
            creator: ActorAddress::new(creator),
            public_value1,
            public_value2: 0,
            is_verified,
            decrypted_value: 0,
        }
    }

    #[test]
    fn empty_store_has_zero_average() {
        let stats = compute_usage_stats(&[]);
        assert_eq!(stats.total_commands, 0);
        assert_eq!(stats.avg_response_time, 0.0);
        assert_eq!(stats.active_users, 0);
    }

    #[test]
    fn averages_public_value_and_counts_distinct_creators() {
        let commands = [
            command("a", "0x01", 10, true),
            command("b", "0x01", 20, false),
        ];
        let stats = compute_usage_stats(&commands);
        assert_eq!(stats.total_commands, 2);
        assert_eq!(stats.verified_commands, 1);
        assert_eq!(stats.avg_response_time, 15.0);
        assert_eq!(stats.active_users, 1);

        let more = [commands[0].clone(), command("c", "0x02", 0, true)];
        assert_eq!(compute_usage_stats(&more).active_users, 2);
    }
}
