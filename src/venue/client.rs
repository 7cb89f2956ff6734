//! HTTP venue adapters for Jupiter, Raydium and Meteora.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::adapter::VenueAdapter;
use super::rate_limit::RateGate;
use super::types::{PricePoint, Quote, VenueId, VenueKind};
use crate::config::Config;
use crate::error::{BotError, ConfigError, VenueError};
use crate::metrics;

/// Amount quoted to price a pair: one whole token at 9 decimals.
pub const PRICING_AMOUNT: u64 = 1_000_000_000;

/// Jupiter quote response.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JupiterQuoteResponse {
    /// Input amount in base units.
    pub in_amount: String,
    /// Output amount in base units.
    pub out_amount: String,
    /// Price impact in percent.
    #[serde(default)]
    pub price_impact_pct: Option<Decimal>,
    /// Routing steps.
    #[serde(default)]
    pub route_plan: Vec<JupiterRouteStep>,
}

/// One step of a Jupiter route.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JupiterRouteStep {
    /// Swap details.
    pub swap_info: JupiterSwapInfo,
}

/// AMM used by a route step.
#[derive(Debug, Clone, Deserialize)]
pub struct JupiterSwapInfo {
    /// AMM label.
    #[serde(default)]
    pub label: Option<String>,
}

/// Raydium response envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct RaydiumEnvelope<T> {
    /// Whether the call succeeded.
    pub success: bool,
    /// Payload.
    pub data: Option<T>,
}

/// Raydium pool summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaydiumPair {
    /// Base mint.
    pub base_mint: String,
    /// Quote mint.
    pub quote_mint: String,
    /// Base reserve.
    #[serde(default)]
    pub base_reserve: Option<Decimal>,
    /// Quote reserve.
    #[serde(default)]
    pub quote_reserve: Option<Decimal>,
}

/// Raydium swap computation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RaydiumSwap {
    /// Input amount.
    pub amount_in: Decimal,
    /// Output amount.
    pub amount_out: Decimal,
    /// Price impact in percent.
    #[serde(default)]
    pub price_impact: Option<Decimal>,
}

/// Meteora pool summary.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteoraPool {
    /// First token mint.
    #[serde(default)]
    pub token_a: Option<String>,
    /// Second token mint.
    #[serde(default)]
    pub token_b: Option<String>,
    /// Liquidity of token A.
    #[serde(default)]
    pub liquidity_a: Option<Decimal>,
    /// Liquidity of token B.
    #[serde(default)]
    pub liquidity_b: Option<Decimal>,
}

/// Meteora swap quote.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeteoraQuote {
    /// Output amount.
    #[serde(default)]
    pub out_amount: Decimal,
    /// Price impact in percent.
    #[serde(default)]
    pub price_impact: Option<Decimal>,
}

/// Venue adapter backed by the venue's public HTTP API.
///
/// The HTTP session lives as long as the adapter and is released when the
/// adapter is dropped.
#[derive(Debug)]
pub struct HttpVenueAdapter {
    kind: VenueKind,
    venue: VenueId,
    base_url: String,
    http: reqwest::Client,
    gate: RateGate,
    instruments: Vec<String>,
    timeout_ms: u64,
}

impl HttpVenueAdapter {
    /// Create an adapter for one venue.
    pub fn new(kind: VenueKind, base_url: impl Into<String>, config: &Config) -> Result<Self, BotError> {
        let http = reqwest::Client::builder()
            .timeout(config.venue_timeout())
            .connect_timeout(Duration::from_millis(500))
            .tcp_nodelay(true)
            .user_agent(concat!("dex-arb/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            kind,
            venue: kind.id(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            gate: RateGate::new(config.venue_requests_per_second),
            instruments: config.monitored_instruments.clone(),
            timeout_ms: config.venue_timeout_ms,
        })
    }

    /// Build one adapter per configured venue, in configuration order.
    pub fn from_config(config: &Config) -> Result<Vec<Arc<dyn VenueAdapter>>, BotError> {
        config
            .venues
            .iter()
            .map(|name| {
                let kind = VenueKind::from_str(name).map_err(|_| {
                    ConfigError::new("VENUES", format!("unknown venue {name}"))
                })?;
                let url = match kind {
                    VenueKind::Jupiter => &config.jupiter_api_url,
                    VenueKind::Raydium => &config.raydium_api_url,
                    VenueKind::Meteora => &config.meteora_api_url,
                };
                let adapter: Arc<dyn VenueAdapter> = Arc::new(Self::new(kind, url.clone(), config)?);
                Ok(adapter)
            })
            .collect()
    }

    /// Which venue API this adapter speaks.
    pub fn kind(&self) -> VenueKind {
        self.kind
    }

    fn map_http_error(&self, err: reqwest::Error) -> VenueError {
        if err.is_timeout() {
            VenueError::Timeout {
                venue: self.venue.clone(),
                timeout_ms: self.timeout_ms,
            }
        } else if err.is_decode() {
            VenueError::DataInvalid {
                venue: self.venue.clone(),
                reason: err.to_string(),
            }
        } else {
            VenueError::Unavailable {
                venue: self.venue.clone(),
                reason: err.to_string(),
            }
        }
    }

    fn invalid(&self, reason: impl Into<String>) -> VenueError {
        VenueError::DataInvalid {
            venue: self.venue.clone(),
            reason: reason.into(),
        }
    }

    /// GET a JSON document, honouring the rate gate.
    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, VenueError> {
        self.gate.acquire().await;

        let url = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let start = Instant::now();

        let response = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| self.map_http_error(e))?;

        metrics::record_venue_request_latency(start, self.venue.as_str());

        if !response.status().is_success() {
            warn!(venue = %self.venue, status = %response.status(), url = %url, "Venue request failed");
            return Err(VenueError::Unavailable {
                venue: self.venue.clone(),
                reason: format!("HTTP {}", response.status()),
            });
        }

        response.json::<T>().await.map_err(|e| self.map_http_error(e))
    }

    async fn jupiter_quote(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, VenueError> {
        let query = [
            ("inputMint", input.to_string()),
            ("outputMint", output.to_string()),
            ("amount", amount.to_string()),
            ("slippageBps", slippage_bps.to_string()),
            ("onlyDirectRoutes", "false".to_string()),
        ];
        let body: JupiterQuoteResponse = self.get_json("quote", &query).await?;

        let in_amount = body
            .in_amount
            .parse::<u64>()
            .map_err(|e| self.invalid(format!("inAmount: {e}")))?;
        let out_amount = body
            .out_amount
            .parse::<u64>()
            .map_err(|e| self.invalid(format!("outAmount: {e}")))?;

        Ok(Quote {
            venue: self.venue.clone(),
            input: input.to_string(),
            output: output.to_string(),
            in_amount,
            out_amount,
            price_impact_pct: body.price_impact_pct.unwrap_or_default(),
            route: body
                .route_plan
                .into_iter()
                .filter_map(|step| step.swap_info.label)
                .collect(),
        })
    }

    async fn raydium_quote(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, VenueError> {
        let query = [
            ("inputMint", input.to_string()),
            ("outputMint", output.to_string()),
            ("amount", amount.to_string()),
            ("slippage", bps_to_fraction(slippage_bps).to_string()),
        ];
        let body: RaydiumEnvelope<RaydiumSwap> = self.get_json("compute/swap", &query).await?;
        let swap = match body {
            RaydiumEnvelope {
                success: true,
                data: Some(swap),
            } => swap,
            _ => return Err(self.invalid("compute/swap returned no data")),
        };

        Ok(Quote {
            venue: self.venue.clone(),
            input: input.to_string(),
            output: output.to_string(),
            in_amount: swap
                .amount_in
                .to_u64()
                .ok_or_else(|| self.invalid("amountIn out of range"))?,
            out_amount: swap
                .amount_out
                .to_u64()
                .ok_or_else(|| self.invalid("amountOut out of range"))?,
            price_impact_pct: swap.price_impact.unwrap_or_default(),
            route: vec![self.venue.to_string()],
        })
    }

    async fn meteora_quote(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, VenueError> {
        let query = [
            ("inputMint", input.to_string()),
            ("outputMint", output.to_string()),
            ("amount", amount.to_string()),
            ("slippage", bps_to_fraction(slippage_bps).to_string()),
        ];
        let body: MeteoraQuote = self.get_json("swap/quote", &query).await?;

        Ok(Quote {
            venue: self.venue.clone(),
            input: input.to_string(),
            output: output.to_string(),
            in_amount: amount,
            out_amount: body
                .out_amount
                .to_u64()
                .ok_or_else(|| self.invalid("outAmount out of range"))?,
            price_impact_pct: body.price_impact.unwrap_or_default(),
            route: vec![self.venue.to_string()],
        })
    }

    /// Quote every monitored pair in both directions.
    async fn jupiter_prices(&self) -> Result<HashMap<String, PricePoint>, VenueError> {
        let mut prices = HashMap::new();
        let mut last_err = None;

        for (i, a) in self.instruments.iter().enumerate() {
            for b in &self.instruments[i + 1..] {
                for (input, output) in [(a, b), (b, a)] {
                    match self.jupiter_quote(input, output, PRICING_AMOUNT, 50).await {
                        Ok(quote) => {
                            if let Some(price) = quote.price() {
                                prices.insert(
                                    format!("{input}-{output}"),
                                    PricePoint {
                                        price,
                                        liquidity: Decimal::ZERO,
                                        price_impact: quote.price_impact_pct,
                                        timestamp: time::OffsetDateTime::now_utc(),
                                    },
                                );
                            }
                        }
                        Err(e) => {
                            debug!(venue = %self.venue, input = %input, output = %output, error = %e, "Pair quote failed");
                            last_err = Some(e);
                        }
                    }
                }
            }
        }

        match last_err {
            Some(err) if prices.is_empty() => Err(err),
            _ => Ok(prices),
        }
    }

    async fn raydium_prices(&self) -> Result<HashMap<String, PricePoint>, VenueError> {
        let body: RaydiumEnvelope<Vec<RaydiumPair>> = self.get_json("pairs", &[]).await?;
        if !body.success {
            return Err(self.invalid("pairs request reported failure"));
        }
        Ok(raydium_price_map(body.data.unwrap_or_default(), &self.instruments))
    }

    async fn meteora_prices(&self) -> Result<HashMap<String, PricePoint>, VenueError> {
        let pools: Vec<MeteoraPool> = self.get_json("pools", &[]).await?;
        Ok(meteora_price_map(pools, &self.instruments))
    }
}

#[async_trait]
impl VenueAdapter for HttpVenueAdapter {
    fn venue(&self) -> &VenueId {
        &self.venue
    }

    #[instrument(skip(self), fields(venue = %self.venue))]
    async fn get_quote(
        &self,
        input: &str,
        output: &str,
        amount: u64,
        slippage_bps: u16,
    ) -> Result<Quote, VenueError> {
        match self.kind {
            VenueKind::Jupiter => self.jupiter_quote(input, output, amount, slippage_bps).await,
            VenueKind::Raydium => self.raydium_quote(input, output, amount, slippage_bps).await,
            VenueKind::Meteora => self.meteora_quote(input, output, amount, slippage_bps).await,
        }
    }

    #[instrument(skip(self), fields(venue = %self.venue))]
    async fn get_all_prices(&self) -> Result<HashMap<String, PricePoint>, VenueError> {
        match self.kind {
            VenueKind::Jupiter => self.jupiter_prices().await,
            VenueKind::Raydium => self.raydium_prices().await,
            VenueKind::Meteora => self.meteora_prices().await,
        }
    }
}

fn bps_to_fraction(bps: u16) -> Decimal {
    Decimal::from(bps) / Decimal::from(10_000u32)
}

/// Reserve ratio of two pool sides, skipping empty pools and pools whose
/// ratio or depth does not fit a `Decimal`.
fn reserve_price(base: Option<Decimal>, quote: Option<Decimal>) -> Option<PricePoint> {
    let base = base.unwrap_or(Decimal::ONE);
    let quote = quote.unwrap_or(Decimal::ONE);
    if base <= Decimal::ZERO || quote <= Decimal::ZERO {
        return None;
    }
    let price = quote.checked_div(base)?;
    let liquidity = base.checked_add(quote)?;
    Some(PricePoint::now(price, liquidity))
}

/// Raydium pools between monitored mints, priced quote/base.
pub fn raydium_price_map(pairs: Vec<RaydiumPair>, instruments: &[String]) -> HashMap<String, PricePoint> {
    pairs
        .into_iter()
        .filter(|p| instruments.contains(&p.base_mint) && instruments.contains(&p.quote_mint))
        .filter_map(|p| {
            let point = reserve_price(p.base_reserve, p.quote_reserve)?;
            Some((format!("{}-{}", p.base_mint, p.quote_mint), point))
        })
        .collect()
}

/// Meteora pools between monitored mints, priced B/A.
pub fn meteora_price_map(pools: Vec<MeteoraPool>, instruments: &[String]) -> HashMap<String, PricePoint> {
    pools
        .into_iter()
        .filter_map(|p| {
            let a = p.token_a?;
            let b = p.token_b?;
            if !instruments.contains(&a) || !instruments.contains(&b) {
                return None;
            }
            let point = reserve_price(p.liquidity_a, p.liquidity_b)?;
            Some((format!("{a}-{b}"), point))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn mints() -> Vec<String> {
        vec!["SOL".to_string(), "USDC".to_string()]
    }

    #[test]
    fn raydium_pairs_are_priced_quote_over_base() {
        let body = r#"{
            "success": true,
            "data": [
                {"baseMint": "SOL", "quoteMint": "USDC", "baseReserve": 1000, "quoteReserve": "150000"},
                {"baseMint": "SOL", "quoteMint": "BONK", "baseReserve": 10, "quoteReserve": 10},
                {"baseMint": "USDC", "quoteMint": "SOL", "baseReserve": 0, "quoteReserve": 5}
            ]
        }"#;
        let envelope: RaydiumEnvelope<Vec<RaydiumPair>> = serde_json::from_str(body).unwrap();
        let prices = raydium_price_map(envelope.data.unwrap(), &mints());

        assert_eq!(prices.len(), 1);
        let point = &prices["SOL-USDC"];
        assert_eq!(point.price, dec!(150));
        assert_eq!(point.liquidity, dec!(151000));
    }

    #[test]
    fn meteora_pools_skip_unknown_tokens() {
        let body = r#"[
            {"tokenA": "USDC", "tokenB": "SOL", "liquidityA": "200", "liquidityB": "1"},
            {"tokenA": "SOL", "liquidityA": "1", "liquidityB": "1"},
            {"tokenA": "SOL", "tokenB": "JUP", "liquidityA": "1", "liquidityB": "1"}
        ]"#;
        let pools: Vec<MeteoraPool> = serde_json::from_str(body).unwrap();
        let prices = meteora_price_map(pools, &mints());

        assert_eq!(prices.len(), 1);
        assert_eq!(prices["USDC-SOL"].price, dec!(0.005));
    }

    #[test]
    fn jupiter_quote_parses() {
        let body = r#"{
            "inAmount": "1000000000",
            "outAmount": "150120000",
            "priceImpactPct": "0.01",
            "routePlan": [{"swapInfo": {"label": "Whirlpool"}}, {"swapInfo": {}}]
        }"#;
        let quote: JupiterQuoteResponse = serde_json::from_str(body).unwrap();
        assert_eq!(quote.in_amount, "1000000000");
        assert_eq!(quote.price_impact_pct, Some(dec!(0.01)));
        assert_eq!(quote.route_plan.len(), 2);
        assert_eq!(quote.route_plan[0].swap_info.label.as_deref(), Some("Whirlpool"));
    }

    #[test]
    fn oversized_reserves_are_skipped() {
        let pairs = vec![
            RaydiumPair {
                base_mint: "SOL".to_string(),
                quote_mint: "USDC".to_string(),
                base_reserve: Some(Decimal::new(1, 10)),
                quote_reserve: Some(Decimal::from_i128_with_scale(79 * 10i128.pow(24), 0)),
            },
            RaydiumPair {
                base_mint: "USDC".to_string(),
                quote_mint: "SOL".to_string(),
                base_reserve: Some(Decimal::MAX),
                quote_reserve: Some(Decimal::MAX),
            },
        ];

        assert!(raydium_price_map(pairs, &mints()).is_empty());
    }

    #[test]
    fn slippage_fraction() {
        assert_eq!(bps_to_fraction(50), dec!(0.005));
    }

    #[test]
    fn from_config_rejects_unknown_venue() {
        let config = Config {
            venues: vec!["jupiter".to_string(), "phoenix".to_string()],
            ..Config::default()
        };
        let Err(err) = HttpVenueAdapter::from_config(&config) else {
            panic!("expected unknown venue error");
        };
        assert!(err.to_string().contains("phoenix"));
    }

    #[test]
    fn from_config_keeps_order() {
        let config = Config::default();
        let adapters = HttpVenueAdapter::from_config(&config).unwrap();
        let ids: Vec<&str> = adapters.iter().map(|a| a.venue().as_str()).collect();
        assert_eq!(ids, vec!["jupiter", "raydium", "meteora"]);
    }
}
