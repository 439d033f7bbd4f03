//! Built-in consumers for the known trading, lottery and naming contracts.

use crate::decompose::{DeleteAction, Decomposer, Rule};
use crate::error::Result;
use crate::schema::{ColumnDef, TableSchema};

/// Raw per-contract transaction counter, never materialized.
const TX_COUNTER: &str = "txCtr";

/// A named, ready-to-use table and rule set.
#[derive(Debug)]
pub struct Preset {
    pub name: &'static str,
    pub description: &'static str,
    /// Default contract id per environment.
    contracts: &'static [(&'static str, &'static str)],
    build: fn() -> Result<Decomposer>,
}

impl Preset {
    /// Default contract id for an environment, if one is published.
    pub fn contract(&self, env: &str) -> Option<&'static str> {
        self.contracts
            .iter()
            .find(|(e, _)| *e == env)
            .map(|(_, id)| *id)
    }

    pub fn environments(&self) -> impl Iterator<Item = &'static str> {
        self.contracts.iter().map(|(env, _)| *env)
    }

    pub fn decomposer(&self) -> Result<Decomposer> {
        (self.build)()
    }
}

static PRESETS: &[Preset] = &[
    Preset {
        name: "asset-trade-exchange",
        description: "Token exchange offers",
        contracts: &[
            (
                "testnet",
                "d8301b171c1554c15a553f26dfd8754963c9201781fd46eb4c547685029afeb8",
            ),
            (
                "simulator",
                "caabd45f02847409f585ada62ee5ad5906f0a3b8f18108be794e9479fc7620f9",
            ),
        ],
        build: asset_trade_exchange,
    },
    Preset {
        name: "asset-trade-auction",
        description: "Token auctions and their bids",
        contracts: &[
            (
                "testnet",
                "a8b7153181a9da75eed78bc523d9496025768569e3ecb8dff60966e7934bcbb1",
            ),
            (
                "simulator",
                "9185fc87f5b48e2a1f26c597a73018cfb405da5ce4a5a32d805249746c762898",
            ),
        ],
        build: asset_trade_auction,
    },
    Preset {
        name: "nft-trade-exchange",
        description: "NFT exchange offers",
        contracts: &[(
            "simulator",
            "bb9a0e49f9c5161218e19d6aba1b683dc8c7fb8f9e2e92179026b252a5d901d0",
        )],
        build: nft_trade_exchange,
    },
    Preset {
        name: "nft-trade-auction",
        description: "NFT auctions and their bids",
        contracts: &[],
        build: nft_trade_auction,
    },
    Preset {
        name: "lotto",
        description: "Lotteries",
        contracts: &[(
            "simulator",
            "95b938ea2aa43a9ddc7a30db3dbcaa311f3bb99320d4b8bde62f42739d35d0b8",
        )],
        build: lotto,
    },
    Preset {
        name: "username",
        description: "Wallet address to username registry",
        contracts: &[(
            "simulator",
            "900f10626046c2160bbaa9bdaee9bf025ff8596d10d5da8af0c6638ba50277f9",
        )],
        build: username,
    },
];

/// All built-in presets.
pub fn all() -> &'static [Preset] {
    PRESETS
}

/// Look up a preset by name.
pub fn find(name: &str) -> Option<&'static Preset> {
    PRESETS.iter().find(|p| p.name == name)
}

fn asset_trade_exchange() -> Result<Decomposer> {
    exchange("asset_trade_exchanges")
}

fn asset_trade_auction() -> Result<Decomposer> {
    auction("asset_trade_auctions", "asset_trade_auction_bids", "auId", true)
}

fn nft_trade_exchange() -> Result<Decomposer> {
    exchange("nft_trade_exchanges")
}

fn nft_trade_auction() -> Result<Decomposer> {
    auction("nft_trade_auctions", "nft_trade_auction_bids", "bidId", false)
}

fn exchange(table: &str) -> Result<Decomposer> {
    let schema = TableSchema::new(
        table,
        vec![ColumnDef::integer("id")],
        vec![
            ColumnDef::integer("sellAmount"),
            ColumnDef::text("sellAssetId"),
            ColumnDef::text("buyAssetId"),
            ColumnDef::integer("buyAmount"),
            ColumnDef::text("seller"),
            ColumnDef::integer("timestamp"),
            ColumnDef::boolean("complete"),
            ColumnDef::integer("completeTimestamp"),
            ColumnDef::text("buyer"),
            ColumnDef::integer("expireTimestamp"),
        ],
    )?
    .require("sellAssetId")?;

    let rule = Rule::builder("state_ex_{id:int}_{column}")
        .table(table)
        .ignore(TX_COUNTER)
        .on_delete(DeleteAction::ClearColumn)
        .build()?;

    Decomposer::new(vec![schema], vec![rule])
}

fn auction(table: &str, bids: &str, bid_key: &str, with_sell_amount: bool) -> Result<Decomposer> {
    let mut columns = vec![ColumnDef::text("sellAssetId")];
    if with_sell_amount {
        columns.push(ColumnDef::integer("sellAmount"));
    }
    columns.extend([
        ColumnDef::integer("startAmount"),
        ColumnDef::integer("startTimestamp"),
        ColumnDef::integer("duration"),
        ColumnDef::text("seller"),
        ColumnDef::text("bidAssetId"),
        ColumnDef::integer("minBidAmount"),
        ColumnDef::integer("bidSum"),
        ColumnDef::integer("bidCount"),
        ColumnDef::integer("timestamp"),
        ColumnDef::boolean("complete"),
        ColumnDef::text("lastBidder"),
    ]);
    let auctions =
        TableSchema::new(table, vec![ColumnDef::integer("id")], columns)?.require("sellAssetId")?;

    let bid_table = TableSchema::new(
        bids,
        vec![ColumnDef::integer(bid_key), ColumnDef::text("bidder")],
        vec![
            ColumnDef::integer("lockedAmount"),
            ColumnDef::integer("timestamp"),
        ],
    )?;

    // bid keys share the auction prefix, so they must be tried first
    let bid_rule = Rule::builder(format!("state_au_{{{bid_key}:int}}_bid_{{bidder}}_{{column}}"))
        .table(bids)
        .ignore(TX_COUNTER)
        .on_delete(DeleteAction::Ignore)
        .build()?;
    let auction_rule = Rule::builder("state_au_{id:int}_{column}")
        .table(table)
        .ignore(TX_COUNTER)
        .on_delete(DeleteAction::ClearColumn)
        .build()?;

    Decomposer::new(vec![auctions, bid_table], vec![bid_rule, auction_rule])
}

fn lotto() -> Result<Decomposer> {
    let schema = TableSchema::new(
        "lotto",
        vec![ColumnDef::text("tx_id")],
        vec![
            ColumnDef::integer("max_tickets"),
            ColumnDef::integer("ticket_price"),
            ColumnDef::integer("ticket_count"),
            ColumnDef::integer("base_reward"),
            ColumnDef::integer("duration"),
            ColumnDef::boolean("unique_wallet"),
            ColumnDef::text("password_hash"),
            ColumnDef::integer("draw_timestamp"),
            ColumnDef::text("claim_tx_id"),
            ColumnDef::integer("claim_timestamp"),
            ColumnDef::integer("start_timestamp"),
            ColumnDef::text("winner"),
            ColumnDef::integer("winning_ticket"),
            ColumnDef::text("winner_comment"),
            ColumnDef::text("owner"),
            ColumnDef::integer("anti_spam_fee"),
        ],
    )?;

    let rule = Rule::builder("state_lotto_{tx_id:word}_{column}")
        .table("lotto")
        .ignore(TX_COUNTER)
        .on_delete(DeleteAction::Ignore)
        .build()?;

    Decomposer::new(vec![schema], vec![rule])
}

fn username() -> Result<Decomposer> {
    let schema = TableSchema::new(
        "usernames",
        vec![ColumnDef::text("wallet_address")],
        vec![ColumnDef::text("name")],
    )?;

    let rule = Rule::builder("state_name_{wallet_address}")
        .table("usernames")
        .column("name")
        .build()?;

    Decomposer::new(vec![schema], vec![rule])
}
