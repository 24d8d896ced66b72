// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! ASN.1 structures making up signature blocks and time-stamp messages. */

pub mod common;
pub mod rfc3161;
pub mod rfc4210;
pub mod rfc5652;
