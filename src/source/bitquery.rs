use super::{JupiterFeed, TradeBatch, TradeQuery, TradeSource};
use crate::errors::{AppError, Result};
use crate::models::{JupiterSwap, TradeRecord, UNKNOWN_CURRENCY};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const BITQUERY_EAP_ENDPOINT: &str = "https://streaming.bitquery.io/eap";

/// Lower bound used when a trade query carries no `since`.
const DEFAULT_TRADES_SINCE: &str = "2023-04-01T00:00:00Z";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

const PING_QUERY: &str = r"{
  Solana {
    Blocks(limit: {count: 1}) {
      Block {
        Time
        Height
      }
    }
  }
}";

const TRADES_QUERY: &str = r"query ArbitrageTrades($token: String!, $since: DateTime!, $limit: Int!) {
  Solana {
    DEXTrades(
      limit: {count: $limit}
      orderBy: {descending: Block_Time}
      where: {
        Block: {Time: {since: $since}}
        Trade: {Buy: {Currency: {MintAddress: {is: $token}}}}
      }
    ) {
      Block {
        Time
      }
      Transaction {
        Signature
      }
      Trade {
        Buy {
          Price
          PriceInUSD
          Amount
          Currency {
            MintAddress
            Name
            Symbol
          }
        }
        Sell {
          Amount
          Currency {
            MintAddress
            Name
            Symbol
          }
        }
        Dex {
          ProtocolName
        }
      }
    }
  }
}";

const PRICE_HISTORY_QUERY: &str = r"query TokenPriceHistory($token: String!, $since: DateTime!, $limit: Int!) {
  Solana {
    DEXTrades(
      limit: {count: $limit}
      orderBy: {ascending: Block_Time}
      where: {
        Block: {Time: {since: $since}}
        Trade: {Buy: {Currency: {MintAddress: {is: $token}}}}
      }
    ) {
      Block {
        Time
      }
      Transaction {
        Signature
      }
      Trade {
        Buy {
          Price
          PriceInUSD
          Currency {
            MintAddress
            Name
            Symbol
          }
        }
        Dex {
          ProtocolName
        }
      }
    }
  }
}";

pub const JUPITER_PROGRAM: &str = "Jupiter Aggregator v6";

const JUPITER_QUERY: &str = r"query JupiterSwaps($program: String!, $limit: Int!) {
  Solana {
    Instructions(
      where: {
        Instruction: {Program: {Name: {is: $program}}}
        Transaction: {Result: {Success: true}}
      }
      limit: {count: $limit}
      orderBy: {descending: Block_Time}
    ) {
      Transaction {
        Signature
      }
      Block {
        Time
      }
      Instruction {
        Program {
          Name
        }
        Accounts {
          Token {
            Mint
          }
        }
        Logs
      }
    }
  }
}";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct SolanaData {
    #[serde(rename = "Solana")]
    solana: Option<DexTradesData>,
}

#[derive(Debug, Deserialize)]
struct DexTradesData {
    #[serde(rename = "DEXTrades", default)]
    dex_trades: Vec<DexTradeRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DexTradeRow {
    block: Option<BlockRow>,
    transaction: Option<TransactionRow>,
    trade: Option<TradeRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BlockRow {
    time: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TransactionRow {
    signature: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TradeRow {
    buy: Option<SideRow>,
    sell: Option<SideRow>,
    dex: Option<DexRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SideRow {
    price: Option<Numeric>,
    #[serde(rename = "PriceInUSD", alias = "PriceUSD")]
    price_in_usd: Option<Numeric>,
    amount: Option<Numeric>,
    currency: Option<CurrencyRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CurrencyRow {
    mint_address: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DexRow {
    protocol_name: Option<String>,
}

/// Bitquery returns amounts as strings and prices as numbers.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn value(&self) -> Option<f64> {
        match self {
            Numeric::Number(n) => Some(*n),
            Numeric::Text(s) => s.trim().parse().ok(),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn currency_label(currency: Option<CurrencyRow>) -> String {
    currency
        .and_then(|c| non_empty(c.name).or(non_empty(c.symbol)).or(non_empty(c.mint_address)))
        .unwrap_or_else(|| UNKNOWN_CURRENCY.to_string())
}

/// Validate one response row. Exchange and timestamp are mandatory.
fn into_record(row: DexTradeRow) -> std::result::Result<TradeRecord, &'static str> {
    let trade = row.trade.unwrap_or_default();
    let exchange =
        non_empty(trade.dex.and_then(|d| d.protocol_name)).ok_or("missing exchange")?;
    let raw_time = non_empty(row.block.and_then(|b| b.time)).ok_or("missing timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_time)
        .map_err(|_| "unparseable timestamp")?
        .with_timezone(&Utc);

    let buy = trade.buy.unwrap_or_default();
    let sell = trade.sell.unwrap_or_default();
    Ok(TradeRecord {
        exchange,
        signature: row
            .transaction
            .and_then(|t| t.signature)
            .unwrap_or_default(),
        timestamp,
        price: buy.price.as_ref().and_then(Numeric::value),
        price_usd: buy.price_in_usd.as_ref().and_then(Numeric::value),
        buy_currency: currency_label(buy.currency),
        sell_currency: currency_label(sell.currency),
        amount: buy.amount.as_ref().and_then(Numeric::value),
    })
}

#[derive(Debug, Deserialize)]
struct SolanaInstructions {
    #[serde(rename = "Solana")]
    solana: Option<InstructionsData>,
}

#[derive(Debug, Deserialize)]
struct InstructionsData {
    #[serde(rename = "Instructions", default)]
    instructions: Vec<InstructionRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstructionRow {
    transaction: Option<TransactionRow>,
    block: Option<BlockRow>,
    instruction: Option<InstructionBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstructionBody {
    program: Option<ProgramRow>,
    accounts: Option<Vec<Option<AccountRow>>>,
    logs: Option<Vec<Option<String>>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProgramRow {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AccountRow {
    token: Option<TokenRow>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct TokenRow {
    mint: Option<String>,
}

fn account_mint(accounts: &mut [Option<AccountRow>], slot: usize) -> String {
    accounts
        .get_mut(slot)
        .and_then(Option::take)
        .and_then(|a| a.token)
        .and_then(|t| non_empty(t.mint))
        .unwrap_or_else(|| UNKNOWN_CURRENCY.to_string())
}

/// Validate one instruction row. The block time is mandatory.
fn into_swap(row: InstructionRow) -> std::result::Result<JupiterSwap, &'static str> {
    let raw_time = non_empty(row.block.and_then(|b| b.time)).ok_or("missing timestamp")?;
    let timestamp = DateTime::parse_from_rfc3339(&raw_time)
        .map_err(|_| "unparseable timestamp")?
        .with_timezone(&Utc);

    let body = row.instruction.unwrap_or_default();
    let mut accounts = body.accounts.unwrap_or_default();
    Ok(JupiterSwap {
        signature: row
            .transaction
            .and_then(|t| t.signature)
            .unwrap_or_default(),
        timestamp,
        program: non_empty(body.program.and_then(|p| p.name))
            .unwrap_or_else(|| UNKNOWN_CURRENCY.to_string()),
        buy_mint: account_mint(&mut accounts, 0),
        sell_mint: account_mint(&mut accounts, 1),
        logs: body.logs.unwrap_or_default().into_iter().flatten().collect(),
    })
}

/// Map the `data` object of an `Instructions` response, newest first.
fn parse_jupiter_swaps(data: Value) -> Result<JupiterFeed> {
    let parsed: SolanaInstructions = serde_json::from_value(data)?;
    let rows = parsed
        .solana
        .ok_or_else(|| AppError::Graphql("response has no Solana section".into()))?
        .instructions;

    let mut feed = JupiterFeed::default();
    for row in rows {
        match into_swap(row) {
            Ok(swap) => feed.swaps.push(swap),
            Err(reason) => {
                feed.malformed += 1;
                debug!(reason, "[SOURCE] dropping malformed instruction row");
            }
        }
    }
    feed.swaps.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    Ok(feed)
}

/// Map the `data` object of a `DEXTrades` response into a batch.
fn parse_dex_trades(data: Value) -> Result<TradeBatch> {
    let parsed: SolanaData = serde_json::from_value(data)?;
    let rows = parsed
        .solana
        .ok_or_else(|| AppError::Graphql("response has no Solana section".into()))?
        .dex_trades;

    let mut batch = TradeBatch::default();
    for row in rows {
        match into_record(row) {
            Ok(record) => batch.records.push(record),
            Err(reason) => {
                batch.malformed += 1;
                debug!(reason, "[SOURCE] dropping malformed trade row");
            }
        }
    }
    Ok(batch)
}

/// Split a GraphQL envelope into its `data` payload or an error.
fn unwrap_envelope(response: GraphqlResponse) -> Result<Value> {
    if !response.errors.is_empty() {
        let messages: Vec<String> = response.errors.into_iter().map(|e| e.message).collect();
        return Err(AppError::Graphql(messages.join("; ")));
    }
    match response.data {
        Some(Value::Null) | None => Err(AppError::Graphql("response carried no data".into())),
        Some(data) => Ok(data),
    }
}

fn format_since(since: DateTime<Utc>) -> String {
    since.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Client for the Bitquery streaming GraphQL API.
#[derive(Clone)]
pub struct BitqueryClient {
    http: reqwest::Client,
    endpoint: Url,
    api_key: String,
}

impl BitqueryClient {
    pub fn new(endpoint: Url, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            endpoint,
            api_key: api_key.into(),
        })
    }

    /// Run a GraphQL query and return its `data` object.
    pub async fn execute(&self, query: &str, variables: Option<Value>) -> Result<Value> {
        let mut payload = json!({ "query": query });
        if let Some(vars) = variables {
            payload["variables"] = vars;
        }
        debug!(endpoint = %self.endpoint, "[SOURCE] sending query");

        let response = self
            .http
            .post(self.endpoint.clone())
            .header("X-API-KEY", &self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        let envelope: GraphqlResponse = response.json().await?;
        unwrap_envelope(envelope)
    }

    /// Cheap authenticated query used to verify the API key.
    pub async fn ping(&self) -> Result<()> {
        self.execute(PING_QUERY, None).await.map(|_| ())
    }

    async fn dex_trades(&self, query: &str, variables: Value) -> Result<TradeBatch> {
        let data = self.execute(query, Some(variables)).await?;
        parse_dex_trades(data)
    }

    /// Latest successful Jupiter aggregator swaps, newest first.
    ///
    /// Failures are logged and yield an empty feed.
    pub async fn fetch_jupiter_arbitrage(&self, limit: u32) -> JupiterFeed {
        let variables = json!({ "program": JUPITER_PROGRAM, "limit": limit });
        let result = self
            .execute(JUPITER_QUERY, Some(variables))
            .await
            .and_then(parse_jupiter_swaps);
        settle("jupiter swaps", JUPITER_PROGRAM, result, |feed: &JupiterFeed| {
            (feed.swaps.len(), feed.malformed)
        })
    }
}

/// Log the outcome of a fetch and degrade failures to an empty value.
///
/// `counts` reports `(records, malformed)` for the log line.
fn settle<T, C>(what: &str, asset: &str, result: Result<T>, counts: C) -> T
where
    T: Default,
    C: Fn(&T) -> (usize, usize),
{
    match result {
        Ok(value) => {
            let (records, malformed) = counts(&value);
            info!(asset, records, malformed, "[SOURCE] fetched {what}");
            value
        }
        Err(e) => {
            warn!(asset, error = %e, "[SOURCE] {what} fetch failed");
            T::default()
        }
    }
}

fn batch_counts(batch: &TradeBatch) -> (usize, usize) {
    (batch.records.len(), batch.malformed)
}

#[async_trait]
impl TradeSource for BitqueryClient {
    async fn fetch_trades(&self, query: &TradeQuery) -> TradeBatch {
        let since = query
            .since
            .map(format_since)
            .unwrap_or_else(|| DEFAULT_TRADES_SINCE.to_string());
        let variables = json!({
            "token": query.asset,
            "since": since,
            "limit": query.limit,
        });
        let result = self.dex_trades(TRADES_QUERY, variables).await;
        settle("trades", &query.asset, result, batch_counts)
    }

    async fn fetch_price_history(
        &self,
        asset: &str,
        since: DateTime<Utc>,
        limit: u32,
    ) -> TradeBatch {
        let variables = json!({
            "token": asset,
            "since": format_since(since),
            "limit": limit,
        });
        let result = self.dex_trades(PRICE_HISTORY_QUERY, variables).await;
        settle("price history", asset, result, batch_counts)
    }
}
