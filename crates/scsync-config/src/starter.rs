/// Written by `scsync init`.
pub const STARTER_CONFIG: &str = r#"# scsync project configuration

# mainnet, testnet or simulator
env = "simulator"
data_dir = "./data"

[daemon]
# Defaults to the local daemon port of `env` when unset.
# endpoint = "127.0.0.1:20000"
timeout_secs = 30
layout = "v1"

[sync]
chunk_size = 1000
# "file" keeps <data_dir>/<env>_counts.json, "sqlite" uses the mirror database.
checkpoints = "file"

[retry]
max_attempts = 5
base_delay_ms = 200
max_delay_ms = 5000

[[consumer]]
name = "usernames"
preset = "username"

# Custom consumers declare their own tables and key templates:
#
# [[consumer]]
# name = "entities"
#
# [consumer.contract]
# simulator = "${ENTITY_SCID}"
#
# [[consumer.table]]
# name = "entities"
# key = [{ name = "id", type = "integer" }]
# columns = [{ name = "name", type = "text" }, { name = "active", type = "boolean" }]
# require = "name"
#
# [[consumer.rule]]
# template = "entity_{id:int}_{column}"
# table = "entities"
# ignore = ["txCtr"]
# on_delete = "delete_row"
"#;
