use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

macro_rules! policy_types {
    ($($variant:ident => $display:literal, $class:literal;)+) => {
        /// Gateway interceptor policies, each bound to the plugin class the gateway loads.
        #[derive(Clone, Copy, Debug, Deserialize, Serialize, JsonSchema, PartialEq, Eq, Hash)]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum PolicyType {
            $($variant,)+
        }

        impl PolicyType {
            pub const ALL: &'static [PolicyType] = &[$(PolicyType::$variant,)+];

            pub fn display_name(&self) -> &'static str {
                match self { $(PolicyType::$variant => $display,)+ }
            }

            pub fn plugin_class(&self) -> &'static str {
                match self { $(PolicyType::$variant => $class,)+ }
            }
        }
    };
}

policy_types! {
    CreateTopicPolicy => "CreateTopicPolicy", "io.conduktor.gateway.interceptor.safeguard.CreateTopicPolicyPlugin";
    AlterTopicPolicy => "AlterTopicPolicy", "io.conduktor.gateway.interceptor.safeguard.AlterTopicConfigPolicyPlugin";
    ProducePolicy => "ProducePolicy", "io.conduktor.gateway.interceptor.safeguard.ProducePolicyPlugin";
    FetchPolicy => "FetchPolicy", "io.conduktor.gateway.interceptor.safeguard.FetchPolicyPlugin";
    ConsumerGroupPolicy => "ConsumerGroupPolicy", "io.conduktor.gateway.interceptor.safeguard.ConsumerGroupPolicyPlugin";
    ClientIdPolicy => "ClientIdPolicy", "io.conduktor.gateway.interceptor.safeguard.ClientIdRequiredPolicyPlugin";
    ProducerRateLimiting => "ProducerRateLimiting", "io.conduktor.gateway.interceptor.safeguard.ProducerRateLimitingPolicyPlugin";
    LimitConnection => "LimitConnection", "io.conduktor.gateway.interceptor.safeguard.LimitConnectionPolicyPlugin";
    LimitJoinGroup => "LimitJoinGroup", "io.conduktor.gateway.interceptor.safeguard.LimitJoinGroupPolicyPlugin";
    SchemaValidation => "SchemaValidation", "io.conduktor.gateway.interceptor.safeguard.SchemaPayloadValidationPolicyPlugin";
    TopicSchemaIdRequired => "TopicSchemaIdRequired", "io.conduktor.gateway.interceptor.safeguard.TopicRequiredSchemaIdPolicyPlugin";
    FieldEncryption => "FieldEncryption", "io.conduktor.gateway.interceptor.EncryptPlugin";
    FieldDecryption => "FieldDecryption", "io.conduktor.gateway.interceptor.DecryptPlugin";
    DataMasking => "DataMasking", "io.conduktor.gateway.interceptor.FieldLevelDataMaskingPlugin";
    Audit => "Audit", "io.conduktor.gateway.interceptor.AuditPlugin";
    HeaderInjection => "HeaderInjection", "io.conduktor.gateway.interceptor.DynamicHeaderInjectionPlugin";
    HeaderRemoval => "HeaderRemoval", "io.conduktor.gateway.interceptor.safeguard.MessageHeaderRemovalPlugin";
    LargeMessageHandling => "LargeMessageHandling", "io.conduktor.gateway.interceptor.LargeMessageHandlingPlugin";
    SqlTopicFiltering => "SqlTopicFiltering", "io.conduktor.gateway.interceptor.VirtualSqlTopicPlugin";
    CelTopicFiltering => "CelTopicFiltering", "io.conduktor.gateway.interceptor.CelTopicPlugin";
    ChaosLatency => "ChaosLatency", "io.conduktor.gateway.interceptor.chaos.SimulateLatencyPlugin";
    ChaosSlowBroker => "ChaosSlowBroker", "io.conduktor.gateway.interceptor.chaos.SimulateSlowBrokerPlugin";
    ChaosSlowProducersConsumers => "ChaosSlowProducersConsumers", "io.conduktor.gateway.interceptor.chaos.SimulateSlowProducersConsumersPlugin";
    ChaosBrokenBroker => "ChaosBrokenBroker", "io.conduktor.gateway.interceptor.chaos.SimulateBrokenBrokersPlugin";
    ChaosLeaderElection => "ChaosLeaderElection", "io.conduktor.gateway.interceptor.chaos.SimulateLeaderElectionsErrorsPlugin";
    ChaosMessageCorruption => "ChaosMessageCorruption", "io.conduktor.gateway.interceptor.chaos.ProduceSimulateMessageCorruptionPlugin";
    ChaosDuplicateMessages => "ChaosDuplicateMessages", "io.conduktor.gateway.interceptor.chaos.DuplicateMessagesPlugin";
}
