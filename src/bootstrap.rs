//! Composition root
//!
//! The only place handlers are registered and capabilities are named.

use std::sync::Arc;

use crate::bus::{Container, HandlerRegistry, MessageBus, WiringError};
use crate::config::{Config, ConfigError, OtpConfig};
use crate::domain::OtpIssued;
use crate::handlers::{
    IssueSignupOtp, IssueSignupOtpHandler, SendOtpHandler, Signup, SignupHandler, VerifyOtp,
    VerifyOtpHandler,
};
use crate::services::{
    Argon2Hasher, HashService, HmacHasher, IdGenerator, Publisher, SmsService,
    SnowflakeIdGenerator,
};
use crate::uow::UnitOfWorkFactory;

/// Capabilities available to handlers, by injection name
#[derive(Clone)]
pub struct Dependencies {
    pub config: Arc<dyn OtpConfig>,
    pub uow: Arc<dyn UnitOfWorkFactory>,
    pub idgen: Arc<dyn IdGenerator>,
    pub hmac_hasher: Arc<dyn HashService>,
    pub pwd_hasher: Arc<dyn HashService>,
    pub sms_service: Arc<dyn SmsService>,
    pub publisher: Option<Arc<dyn Publisher>>,
}

impl Dependencies {
    /// Production capabilities derived from configuration
    pub fn from_config(
        config: &Config,
        uow: Arc<dyn UnitOfWorkFactory>,
        sms_service: Arc<dyn SmsService>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            config: Arc::new(config.otp.clone()),
            uow,
            idgen: Arc::new(SnowflakeIdGenerator::new(config.snowflake.clone())?),
            hmac_hasher: Arc::new(HmacHasher::new(config.hmac_secret_key.clone())),
            pwd_hasher: Arc::new(Argon2Hasher::new()),
            sms_service,
            publisher: None,
        })
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn into_container(self) -> Container {
        let container = Container::new()
            .provide("config", self.config)
            .provide("uow", self.uow)
            .provide("idgen", self.idgen)
            .provide("hmac_hasher", self.hmac_hasher)
            .provide("pwd_hasher", self.pwd_hasher)
            .provide("sms_service", self.sms_service);

        match self.publisher {
            Some(publisher) => container.provide("publisher", publisher),
            None => container,
        }
    }
}

/// Register every workflow handler exactly once
pub fn register_handlers(registry: &mut HandlerRegistry) -> Result<(), WiringError> {
    registry
        .register_command::<IssueSignupOtp, IssueSignupOtpHandler>()?
        .register_command::<VerifyOtp, VerifyOtpHandler>()?
        .register_command::<Signup, SignupHandler>()?
        .register_event::<OtpIssued, SendOtpHandler>();
    Ok(())
}

/// Build the message bus, failing fast on any wiring problem
pub fn bootstrap(deps: Dependencies) -> Result<MessageBus, WiringError> {
    let mut registry = HandlerRegistry::new();
    register_handlers(&mut registry)?;
    registry.build(&deps.into_container())
}
