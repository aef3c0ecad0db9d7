//! Protocol message definitions
//!
//! Defines the requests sent to the modelling microservice and the replies
//! it returns. The `type` field is the only discriminator on the wire; the
//! decoder dispatches on it and trusts it.

use serde::{Deserialize, Serialize};

/// Outbound requests to the microservice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Request {
    /// Mandatory handshake: declares the training-data window and tells the
    /// service where to pull that data from. Must be the first message on
    /// every connection; the service accepts nothing else until it has
    /// replied to this.
    #[serde(rename = "INIT")]
    Init {
        /// Training window start, ISO date (`2023-01-01`)
        tr_start: String,
        /// Training window end, ISO date
        tr_end: String,
        db_name: String,
        db_host: String,
        db_port: u16,
        db_username: String,
        db_password: String,
    },

    /// Fare prediction for a single trip
    #[serde(rename = "PRED")]
    Predict {
        /// Trip distance; non-negative by convention, not validated here
        trip_distance: f64,
        /// ISO-8601 datetime with timezone offset, validated by the caller
        datetime: String,
    },
}

impl Request {
    /// Wire name of the discriminator, for logging
    pub fn kind(&self) -> &'static str {
        match self {
            Request::Init { .. } => "INIT",
            Request::Predict { .. } => "PRED",
        }
    }
}

/// Acknowledgement of an `Init` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InitAck {
    /// Human-readable status from the service ("models fitted", ...)
    pub msg: String,
}

/// Reply to a `Predict` request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prediction {
    /// Predicted fare for the trip
    pub prediction: f64,
    /// Expected revenue including tips
    pub expected_revenue: f64,
}

/// Inbound replies from the microservice
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum Response {
    /// Reply to `Init`
    #[serde(rename = "INIT")]
    Init(InitAck),

    /// Reply to `Predict`
    #[serde(rename = "PRED")]
    Pred(Prediction),
}

impl Response {
    pub fn kind(&self) -> &'static str {
        match self {
            Response::Init(_) => "INIT",
            Response::Pred(_) => "PRED",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_wire_shape() {
        let request = Request::Init {
            tr_start: "2023-01-01".to_string(),
            tr_end: "2024-01-01".to_string(),
            db_name: "taxis_and_ubers".to_string(),
            db_host: "localhost".to_string(),
            db_port: 5432,
            db_username: "haekim".to_string(),
            db_password: "password".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"type":"INIT","tr_start":"2023-01-01","tr_end":"2024-01-01","db_name":"taxis_and_ubers","db_host":"localhost","db_port":5432,"db_username":"haekim","db_password":"password"}"#
        );
    }

    #[test]
    fn test_predict_wire_shape() {
        let request = Request::Predict {
            trip_distance: 15.4,
            datetime: "2023-04-04T14:11:00+11:00".to_string(),
        };

        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(
            json,
            r#"{"type":"PRED","trip_distance":15.4,"datetime":"2023-04-04T14:11:00+11:00"}"#
        );
    }

    #[test]
    fn test_decode_prediction_reply() {
        let reply: Response =
            serde_json::from_str(r#"{"type":"PRED","prediction":0.82,"expected_revenue":23.10}"#)
                .unwrap();

        match reply {
            Response::Pred(p) => {
                assert_eq!(p.prediction, 0.82);
                assert_eq!(p.expected_revenue, 23.10);
            }
            Response::Init(_) => panic!("wrong reply type"),
        }
    }

    #[test]
    fn test_decode_init_reply() {
        let reply: Response =
            serde_json::from_str(r#"{"type":"INIT","msg":"models fitted"}"#).unwrap();
        assert_eq!(
            reply,
            Response::Init(InitAck {
                msg: "models fitted".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<Response, _> = serde_json::from_str(r#"{"type":"NOPE","msg":"hi"}"#);
        assert!(result.is_err());
    }
}
