use async_trait::async_trait;

use relay_fanout::{broker::BrokerConnection, relay::BrokerConnector, FanoutResult, WsBrokerConnection};

pub struct WsBrokerConnector {
    pub base_url: String,
    pub uid: String,
    pub sample_rate: u32,
}

#[async_trait]
impl BrokerConnector for WsBrokerConnector {
    async fn connect(&self) -> FanoutResult<Box<dyn BrokerConnection>> {
        let conn = WsBrokerConnection::connect(&self.base_url, &self.uid, self.sample_rate).await?;
        Ok(Box::new(conn))
    }
}
